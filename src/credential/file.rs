//! JSON file persistence for saved credentials
//!
//! The file holds every server's record in one document, rewritten on each
//! change. Writes go to a sibling temp file first and are renamed into
//! place.

use super::store::{CredentialBackend, CredentialRecord, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const FILE_VERSION: u32 = 1;
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    #[serde(default)]
    entries: Vec<CredentialRecord>,
}

pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/eduvpn-session/credentials.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(crate::APP_DIR_NAME).join(CREDENTIALS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        if !self.path.exists() {
            debug!("No credential file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let file: CredentialFile = serde_json::from_str(&content)?;
        if file.version != FILE_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }
        Ok(file.entries)
    }

    fn save(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = CredentialFile {
            version: FILE_VERSION,
            entries: records.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} credential(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}
