//! Connection state observation
//!
//! The tunnel itself (OpenVPN, WireGuard) lives outside this crate. We only
//! watch its status, derive telemetry that is meaningful while connected,
//! and forward a disconnect request.

pub mod monitor;
pub mod observable;
pub mod status;

pub use monitor::ConnectionMonitor;
pub use observable::Observable;
pub use status::{ConnectionStatus, OpenVpnLevel, StatusError};

/// Traffic counters reported by the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCount {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Addresses the VPN server assigned to this client
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssignedIps {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl AssignedIps {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }

    /// Parse the addresses out of OpenVPN's "connected" state log line
    ///
    /// The line has exactly seven comma-separated fields: the IPv4 address
    /// is the second and the IPv6 address the last. Empty fields mean the
    /// address was not assigned.
    pub fn parse_log_message(message: &str) -> Option<Self> {
        // Trailing empty fields count toward the seven, so a line with an
        // empty IPv6 field parses as IPv4-only instead of being rejected.
        let fields: Vec<&str> = message.split(',').collect();
        if fields.len() != 7 {
            return None;
        }
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Some(Self {
            ipv4: non_empty(fields[1]),
            ipv6: non_empty(fields[6]).map(|ip| normalize_ipv6(&ip)),
        })
    }

    /// Build from raw interface addresses, IPv4 and IPv6 told apart by `:`
    pub fn from_interface_addresses<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut ips = Self::default();
        for address in addresses {
            if address.contains(':') {
                ips.ipv6 = Some(normalize_ipv6(address));
            } else {
                ips.ipv4 = Some(address.to_string());
            }
        }
        (!ips.is_empty()).then_some(ips)
    }
}

/// Strip a `%zone` suffix and lowercase an IPv6 address
pub fn normalize_ipv6(address: &str) -> String {
    let bare = match address.find('%') {
        Some(idx) => &address[..idx],
        None => address,
    };
    bare.to_lowercase()
}

/// The VPN transport, as seen from this crate
pub trait Tunnel: Send + Sync {
    fn status(&self) -> ConnectionStatus;
    fn byte_count(&self) -> ByteCount;
    fn assigned_ips(&self) -> AssignedIps;
    /// Human-readable cause of the last failure, if the transport has one
    fn error_string(&self) -> Option<String>;
    fn disconnect(&self);
    fn protocol_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_message() {
        let message = "1700000000,10.8.0.2,SUCCESS,192.0.2.1,1194,,2001:DB8::1000";
        let ips = AssignedIps::parse_log_message(message).unwrap();
        assert_eq!(ips.ipv4.as_deref(), Some("10.8.0.2"));
        assert_eq!(ips.ipv6.as_deref(), Some("2001:db8::1000"));
    }

    #[test]
    fn test_parse_log_message_empty_fields() {
        let ips = AssignedIps::parse_log_message("a,,c,d,e,f,").unwrap();
        assert!(ips.is_empty());
    }

    #[test]
    fn test_parse_log_message_wrong_field_count() {
        assert!(AssignedIps::parse_log_message("").is_none());
        assert!(AssignedIps::parse_log_message("a,b,c").is_none());
        assert!(AssignedIps::parse_log_message("a,b,c,d,e,f,g,h").is_none());
    }

    #[test]
    fn test_normalize_ipv6() {
        assert_eq!(normalize_ipv6("FE80::1%tun0"), "fe80::1");
        assert_eq!(normalize_ipv6("2001:DB8::1"), "2001:db8::1");
    }

    #[test]
    fn test_from_interface_addresses() {
        let ips = AssignedIps::from_interface_addresses(["10.8.0.2", "FD00::2%tun0"]).unwrap();
        assert_eq!(ips.ipv4.as_deref(), Some("10.8.0.2"));
        assert_eq!(ips.ipv6.as_deref(), Some("fd00::2"));

        assert!(AssignedIps::from_interface_addresses(Vec::<&str>::new()).is_none());
    }
}
