//! HTTP client for the eduVPN discovery files
//!
//! Fetches `organization_list.json` and `server_list.json` (v2 format).
//! Display names and keywords come either as a plain string or as a map
//! from language tag to string.

use super::{DiscoveryError, Organization, OrganizationService, ServerInstance, ServerType};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ORGANIZATION_LIST_URL: &str = "https://disco.eduvpn.org/v2/organization_list.json";
pub const DEFAULT_SERVER_LIST_URL: &str = "https://disco.eduvpn.org/v2/server_list.json";

const REQUEST_TIMEOUT_SECS: u64 = 15;
const PREFERRED_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedText {
    fn resolve(self) -> Option<String> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Localized(mut by_language) => {
                if let Some(text) = by_language.remove(PREFERRED_LANGUAGE) {
                    return Some(text);
                }
                let prefixed = by_language
                    .keys()
                    .find(|lang| lang.starts_with(PREFERRED_LANGUAGE))
                    .cloned();
                match prefixed {
                    Some(lang) => by_language.remove(&lang),
                    None => by_language.into_values().next(),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrganizationListJson {
    organization_list: Vec<OrganizationJson>,
}

#[derive(Debug, Deserialize)]
struct OrganizationJson {
    org_id: String,
    display_name: LocalizedText,
    #[serde(default)]
    secure_internet_home: Option<String>,
    #[serde(default)]
    keyword_list: Option<LocalizedText>,
}

#[derive(Debug, Deserialize)]
struct ServerListJson {
    server_list: Vec<ServerJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ServerTypeJson {
    InstituteAccess,
    SecureInternet,
}

#[derive(Debug, Deserialize)]
struct ServerJson {
    base_url: String,
    server_type: ServerTypeJson,
    #[serde(default)]
    display_name: Option<LocalizedText>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    support_contact: Vec<String>,
}

fn parse_organization_list(body: &str) -> Result<Vec<Organization>, DiscoveryError> {
    let list: OrganizationListJson = serde_json::from_str(body)?;
    Ok(list
        .organization_list
        .into_iter()
        .map(|org| Organization {
            display_name: org.display_name.resolve().unwrap_or_else(|| org.org_id.clone()),
            org_id: org.org_id,
            secure_internet_home: org.secure_internet_home,
            keyword_list: org
                .keyword_list
                .and_then(LocalizedText::resolve)
                .map(|keywords| keywords.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        })
        .collect())
}

fn parse_server_list(body: &str) -> Result<Vec<ServerInstance>, DiscoveryError> {
    let list: ServerListJson = serde_json::from_str(body)?;
    Ok(list
        .server_list
        .into_iter()
        .map(|server| ServerInstance {
            base_url: server.base_url,
            display_name: server.display_name.and_then(LocalizedText::resolve),
            server_type: match server.server_type {
                ServerTypeJson::InstituteAccess => ServerType::InstituteAccess,
                ServerTypeJson::SecureInternet => ServerType::SecureInternet,
            },
            country_code: server.country_code,
            support_contact: server.support_contact,
        })
        .collect())
}

pub struct HttpOrganizationService {
    client: Client,
    organization_list_url: String,
    server_list_url: String,
}

impl HttpOrganizationService {
    pub fn new(
        organization_list_url: impl Into<String>,
        server_list_url: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            organization_list_url: organization_list_url.into(),
            server_list_url: server_list_url.into(),
        })
    }

    /// Client for the public eduVPN discovery endpoints
    pub fn eduvpn() -> Result<Self, DiscoveryError> {
        Self::new(DEFAULT_ORGANIZATION_LIST_URL, DEFAULT_SERVER_LIST_URL)
    }

    async fn get_text(&self, url: &str) -> Result<String, DiscoveryError> {
        debug!("Fetching {}", url);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl OrganizationService for HttpOrganizationService {
    async fn fetch_organizations(&self) -> Result<Vec<Organization>, DiscoveryError> {
        let body = self.get_text(&self.organization_list_url).await?;
        let organizations = parse_organization_list(&body)?;
        info!("Fetched {} organizations", organizations.len());
        Ok(organizations)
    }

    async fn fetch_server_list(&self) -> Result<Vec<ServerInstance>, DiscoveryError> {
        let body = self.get_text(&self.server_list_url).await?;
        let servers = parse_server_list(&body)?;
        info!("Fetched {} servers", servers.len());
        Ok(servers)
    }
}
