//! VPN connection status

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatusError {
    #[error("Unknown connection status: {0}")]
    UnknownStatus(String),
    #[error("Unknown OpenVPN level: {0}")]
    UnknownLevel(String),
}

/// Simplified status of the tunnel, as reported by the transport
///
/// The transport is authoritative: any transition it reports is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Paused,
    Failed,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Paused => "paused",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "paused" => Ok(Self::Paused),
            "failed" => Ok(Self::Failed),
            _ => Err(StatusError::UnknownStatus(s.to_string())),
        }
    }
}

/// Detailed connection levels reported by the OpenVPN library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenVpnLevel {
    Start,
    ConnectingNoServerReply,
    ConnectingServerReplied,
    Connected,
    VpnPaused,
    AuthFailed,
    NoNetwork,
    NotConnected,
    WaitingForUserInput,
    Unknown,
}

impl std::str::FromStr for OpenVpnLevel {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEVEL_START" => Ok(Self::Start),
            "LEVEL_CONNECTING_NO_SERVER_REPLY_YET" => Ok(Self::ConnectingNoServerReply),
            "LEVEL_CONNECTING_SERVER_REPLIED" => Ok(Self::ConnectingServerReplied),
            "LEVEL_CONNECTED" => Ok(Self::Connected),
            "LEVEL_VPNPAUSED" => Ok(Self::VpnPaused),
            "LEVEL_AUTH_FAILED" => Ok(Self::AuthFailed),
            "LEVEL_NONETWORK" => Ok(Self::NoNetwork),
            "LEVEL_NOTCONNECTED" => Ok(Self::NotConnected),
            "LEVEL_WAITING_FOR_USER_INPUT" => Ok(Self::WaitingForUserInput),
            "UNKNOWN_LEVEL" => Ok(Self::Unknown),
            _ => Err(StatusError::UnknownLevel(s.to_string())),
        }
    }
}

impl From<OpenVpnLevel> for ConnectionStatus {
    fn from(level: OpenVpnLevel) -> Self {
        match level {
            OpenVpnLevel::Start
            | OpenVpnLevel::ConnectingNoServerReply
            | OpenVpnLevel::ConnectingServerReplied => Self::Connecting,
            OpenVpnLevel::Connected => Self::Connected,
            OpenVpnLevel::VpnPaused => Self::Paused,
            OpenVpnLevel::AuthFailed => Self::Failed,
            OpenVpnLevel::NoNetwork
            | OpenVpnLevel::NotConnected
            | OpenVpnLevel::WaitingForUserInput
            | OpenVpnLevel::Unknown => Self::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Paused,
            ConnectionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ConnectionStatus>().unwrap(), status);
        }
        assert_eq!("CONNECTED".parse::<ConnectionStatus>().unwrap(), ConnectionStatus::Connected);
        assert!(matches!(
            "online".parse::<ConnectionStatus>(),
            Err(StatusError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_openvpn_levels_map_to_status() {
        let cases = [
            ("LEVEL_START", ConnectionStatus::Connecting),
            ("LEVEL_CONNECTING_NO_SERVER_REPLY_YET", ConnectionStatus::Connecting),
            ("LEVEL_CONNECTING_SERVER_REPLIED", ConnectionStatus::Connecting),
            ("LEVEL_CONNECTED", ConnectionStatus::Connected),
            ("LEVEL_VPNPAUSED", ConnectionStatus::Paused),
            ("LEVEL_AUTH_FAILED", ConnectionStatus::Failed),
            ("LEVEL_NONETWORK", ConnectionStatus::Disconnected),
            ("LEVEL_NOTCONNECTED", ConnectionStatus::Disconnected),
            ("LEVEL_WAITING_FOR_USER_INPUT", ConnectionStatus::Disconnected),
            ("UNKNOWN_LEVEL", ConnectionStatus::Disconnected),
        ];
        for (raw, expected) in cases {
            let level: OpenVpnLevel = raw.parse().unwrap();
            assert_eq!(ConnectionStatus::from(level), expected, "{}", raw);
        }
    }

    #[test]
    fn test_unknown_openvpn_level() {
        assert_eq!(
            "LEVEL_BOGUS".parse::<OpenVpnLevel>(),
            Err(StatusError::UnknownLevel("LEVEL_BOGUS".to_string()))
        );
    }

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Paused.is_connected());
        assert!(!ConnectionStatus::default().is_connected());
    }
}
