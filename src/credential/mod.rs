//! Per-server credentials
//!
//! A credential ties a server identity to the key pair provisioned for it.
//! The key pair carries the certificate expiry that drives the rest of the
//! engine. Alongside it we keep the timestamp of the last successful
//! authorization, which gates manual renewal.

pub mod file;
pub mod store;

pub use file::JsonFileBackend;
pub use store::{CredentialBackend, CredentialStore, StoreError, StoredCredential};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a VPN server instance, usually its base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerIdentity(String);

impl ServerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ServerIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Key material returned by the provisioning API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// PEM-encoded client certificate
    pub certificate: String,
    /// PEM-encoded private key
    pub private_key: String,
    /// When the certificate stops being valid (UNIX epoch milliseconds)
    #[serde(default)]
    pub expiry_time_millis: Option<i64>,
}

// Keep the private key out of logs.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("expiry_time_millis", &self.expiry_time_millis)
            .finish()
    }
}

/// The key pair saved for one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub server: ServerIdentity,
    pub key_pair: KeyPair,
}

impl Credential {
    pub fn new(server: ServerIdentity, key_pair: KeyPair) -> Self {
        Self { server, key_pair }
    }

    pub fn expiry_time_millis(&self) -> Option<i64> {
        self.key_pair.expiry_time_millis
    }
}

/// Last successful authorization against a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub authorized_at_millis: i64,
}

impl AuthorizationRecord {
    pub fn at(authorized_at_millis: i64) -> Self {
        Self {
            authorized_at_millis,
        }
    }
}

/// Outcome of a successful authorization + provisioning round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedSession {
    pub credential: Credential,
    pub authorization: AuthorizationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_identity_serializes_as_plain_string() {
        let id = ServerIdentity::new("https://vpn.example.org/");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"https://vpn.example.org/\"");
        assert_eq!(id.to_string(), "https://vpn.example.org/");
    }

    #[test]
    fn test_key_pair_debug_redacts_private_key() {
        let key_pair = KeyPair {
            certificate: "CERT".to_string(),
            private_key: "SUPER-SECRET".to_string(),
            expiry_time_millis: Some(1),
        };
        let debug = format!("{:?}", key_pair);
        assert!(!debug.contains("SUPER-SECRET"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_key_pair_missing_expiry_deserializes_as_none() {
        let json = r#"{"certificate":"c","private_key":"k"}"#;
        let key_pair: KeyPair = serde_json::from_str(json).unwrap();
        assert_eq!(key_pair.expiry_time_millis, None);
    }
}
