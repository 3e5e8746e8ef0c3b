//! In-memory credential store with optional persistence
//!
//! Readers get an `Arc<StoredCredential>` snapshot, so the server identity,
//! key pair and expiry they see always belong together even if a renewal
//! replaces the entry a moment later.

use super::{AuthorizationRecord, Credential, KeyPair, ProvisionedSession, ServerIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access credential file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse credential file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Unsupported credential file version: {0}")]
    UnsupportedVersion(u32),
}

/// Persisted shape of one credential entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub server: ServerIdentity,
    pub key_pair: KeyPair,
    #[serde(default)]
    pub authorized_at_millis: Option<i64>,
}

/// Where the store keeps its entries between runs
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Vec<CredentialRecord>, StoreError>;
    fn save(&self, records: &[CredentialRecord]) -> Result<(), StoreError>;
}

/// Consistent view of one server's credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub credential: Credential,
    pub authorization: Option<AuthorizationRecord>,
    /// Bumped every time the entry for any server is written. Two snapshots
    /// with the same generation are the same credential.
    pub generation: u64,
}

impl StoredCredential {
    pub fn server(&self) -> &ServerIdentity {
        &self.credential.server
    }

    pub fn expiry_time_millis(&self) -> Option<i64> {
        self.credential.expiry_time_millis()
    }

    pub fn authorized_at_millis(&self) -> Option<i64> {
        self.authorization.map(|a| a.authorized_at_millis)
    }

    fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            server: self.credential.server.clone(),
            key_pair: self.credential.key_pair.clone(),
            authorized_at_millis: self.authorized_at_millis(),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_server: HashMap<ServerIdentity, Arc<StoredCredential>>,
    next_generation: u64,
}

impl Entries {
    fn records(&self) -> Vec<CredentialRecord> {
        let mut records: Vec<_> = self.by_server.values().map(|e| e.to_record()).collect();
        records.sort_by(|a, b| a.server.cmp(&b.server));
        records
    }
}

/// One credential per server identity
pub struct CredentialStore {
    entries: RwLock<Entries>,
    backend: Option<Box<dyn CredentialBackend>>,
}

impl CredentialStore {
    /// Create an empty store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            backend: None,
        }
    }

    /// Open a store backed by `backend`, loading whatever it holds
    pub fn open(backend: Box<dyn CredentialBackend>) -> Result<Self, StoreError> {
        let mut entries = Entries::default();
        for record in backend.load()? {
            entries.next_generation += 1;
            let stored = StoredCredential {
                credential: Credential::new(record.server.clone(), record.key_pair),
                authorization: record.authorized_at_millis.map(AuthorizationRecord::at),
                generation: entries.next_generation,
            };
            entries.by_server.insert(record.server, Arc::new(stored));
        }
        info!("Loaded {} saved credential(s)", entries.by_server.len());

        Ok(Self {
            entries: RwLock::new(entries),
            backend: Some(backend),
        })
    }

    /// Current credential for `server`, if any
    pub fn get(&self, server: &ServerIdentity) -> Option<Arc<StoredCredential>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.by_server.get(server).cloned()
    }

    /// All saved credentials, ordered by server identity
    pub fn all(&self) -> Vec<Arc<StoredCredential>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = entries.by_server.values().cloned().collect();
        all.sort_by(|a, b| a.server().cmp(b.server()));
        all
    }

    pub fn is_empty(&self) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.by_server.is_empty()
    }

    /// Save the result of a successful provisioning round, superseding any
    /// earlier credential for the same server
    pub fn replace(&self, session: ProvisionedSession) -> Result<Arc<StoredCredential>, StoreError> {
        self.put(session.credential, Some(session.authorization))
    }

    /// Save a credential, optionally with its authorization timestamp
    pub fn put(
        &self,
        credential: Credential,
        authorization: Option<AuthorizationRecord>,
    ) -> Result<Arc<StoredCredential>, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let generation = entries.next_generation + 1;
        let server = credential.server.clone();
        let stored = Arc::new(StoredCredential {
            credential,
            authorization,
            generation,
        });

        // Roll back on a failed write so memory and disk stay in agreement.
        let previous = entries.by_server.insert(server.clone(), Arc::clone(&stored));
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.save(&entries.records()) {
                match previous {
                    Some(prev) => entries.by_server.insert(server, prev),
                    None => entries.by_server.remove(&server),
                };
                return Err(e);
            }
        }
        entries.next_generation = generation;

        debug!(
            "Saved credential for {} (generation {}, expires {:?})",
            stored.server(),
            generation,
            stored.expiry_time_millis()
        );
        Ok(stored)
    }

    /// Forget the credential for `server`
    ///
    /// Returns the removed entry; removing an unknown server is not an error.
    pub fn remove(&self, server: &ServerIdentity) -> Result<Option<Arc<StoredCredential>>, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(removed) = entries.by_server.remove(server) else {
            return Ok(None);
        };

        if let Some(backend) = &self.backend {
            if let Err(e) = backend.save(&entries.records()) {
                entries.by_server.insert(server.clone(), removed);
                return Err(e);
            }
        }

        info!("Removed saved credential for {}", server);
        Ok(Some(removed))
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
