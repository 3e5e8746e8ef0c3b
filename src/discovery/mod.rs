//! External collaborators: authorization and server discovery
//!
//! Authorization (OAuth + key pair provisioning) and organization / server
//! listing happen outside this crate. They are consumed through the traits
//! below; `http` provides a `reqwest` client for the public listing
//! endpoints.

pub mod http;

pub use http::HttpOrganizationService;

use crate::credential::{ProvisionedSession, ServerIdentity};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid discovery response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(String),
}

/// Authorizes against a server and provisions a fresh key pair
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Run discovery + authorization for `server`
    ///
    /// With `force_reauth`, cached tokens are ignored and the user goes
    /// through authorization again.
    async fn discover_api(
        &self,
        server: &ServerIdentity,
        force_reauth: bool,
    ) -> Result<ProvisionedSession, DiscoveryError>;
}

/// Read-only listing of organizations and servers
#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn fetch_organizations(&self) -> Result<Vec<Organization>, DiscoveryError>;
    async fn fetch_server_list(&self) -> Result<Vec<ServerInstance>, DiscoveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub org_id: String,
    pub display_name: String,
    /// Base URL of the organization's Secure Internet home server
    pub secure_internet_home: Option<String>,
    pub keyword_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    InstituteAccess,
    SecureInternet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstance {
    pub base_url: String,
    pub display_name: Option<String>,
    pub server_type: ServerType,
    pub country_code: Option<String>,
    pub support_contact: Vec<String>,
}

impl ServerInstance {
    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity::new(self.base_url.clone())
    }

    /// Support contacts without their `mailto:` / `tel:` scheme
    pub fn support_contacts(&self) -> Vec<String> {
        self.support_contact
            .iter()
            .map(|contact| {
                contact
                    .strip_prefix("mailto:")
                    .or_else(|| contact.strip_prefix("tel:"))
                    .unwrap_or(contact)
                    .to_string()
            })
            .collect()
    }
}
