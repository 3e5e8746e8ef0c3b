//! eduVPN session engine
//!
//! Tracks the certificate of the server a VPN client is connected to,
//! counts down its validity, arms a background alarm before it expires,
//! observes the tunnel and gates manual renewal behind a cooldown. The
//! authorization flow and the tunnel transport are external collaborators
//! injected through traits.
//!
//! # Architecture
//!
//! - `credential`: Key pairs per server, atomic snapshots, JSON persistence
//! - `expiry`: Validity countdown, alarm planning, alarm capability
//! - `connection`: Tunnel status observer and connection-gated telemetry
//! - `renewal`: Renewal cooldown and the renew/reconnect operations
//! - `discovery`: Authorization and organization/server list collaborators
//! - `session`: Engine wiring the above to UI lifecycle events
//! - `config`: Configuration file handling (TOML)
//! - `notify`: Desktop notifications for expiry alerts
//!
//! # Usage
//!
//! ```bash
//! eduvpn-session status
//! eduvpn-session watch https://vpn.example.org/ --connected
//! ```

pub mod config;
pub mod connection;
pub mod credential;
pub mod discovery;
pub mod expiry;
pub mod notify;
pub mod renewal;
pub mod session;
pub mod time;

/// Directory name under the platform config and data directories
pub const APP_DIR_NAME: &str = "eduvpn-session";

pub use config::Config;
pub use connection::{ConnectionMonitor, ConnectionStatus, Tunnel};
pub use credential::{CredentialStore, JsonFileBackend, ServerIdentity, StoredCredential};
pub use expiry::{ExpiryStatus, ValidityBucket, classify_expiry, plan_notification};
pub use renewal::can_renew;
pub use session::{SessionEngine, SessionError, SessionEvent, SessionParts};
