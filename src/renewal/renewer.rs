//! Renew and reconnect operations
//!
//! Both go through the authorization service and end by replacing the
//! server's credential. Only one such operation may run per server at a
//! time; overlapping provisioning would race on the store.

use crate::credential::{CredentialStore, ServerIdentity, StoreError, StoredCredential};
use crate::discovery::{AuthorizationService, DiscoveryError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RenewalError {
    #[error("A renewal for {0} is already in progress")]
    InProgress(ServerIdentity),
    #[error("Authorization failed: {0}")]
    Authorization(#[from] DiscoveryError),
    #[error("Failed to save credential: {0}")]
    Store(#[from] StoreError),
}

type InFlight = Arc<Mutex<HashSet<ServerIdentity>>>;

/// Marks a server busy until dropped, including when the owning future is
/// cancelled
struct InFlightGuard {
    in_flight: InFlight,
    server: ServerIdentity,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, server: &ServerIdentity) -> Result<Self, RenewalError> {
        let mut busy = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(server.clone()) {
            return Err(RenewalError::InProgress(server.clone()));
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            server: server.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.server);
    }
}

#[derive(Clone)]
pub struct Renewer {
    auth: Arc<dyn AuthorizationService>,
    store: Arc<CredentialStore>,
    in_flight: InFlight,
}

impl Renewer {
    pub fn new(auth: Arc<dyn AuthorizationService>, store: Arc<CredentialStore>) -> Self {
        Self {
            auth,
            store,
            in_flight: Arc::default(),
        }
    }

    pub fn is_in_flight(&self, server: &ServerIdentity) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(server)
    }

    /// Re-authorize and provision a new credential for `server`
    ///
    /// Failures are returned as-is; nothing is retried.
    pub async fn renew(&self, server: &ServerIdentity) -> Result<Arc<StoredCredential>, RenewalError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, server)?;
        info!("Renewing session for {}", server);
        self.provision(server, true).await
    }

    /// Drop the saved credential for `server` and provision from scratch
    pub async fn reconnect_to_instance(
        &self,
        server: &ServerIdentity,
    ) -> Result<Arc<StoredCredential>, RenewalError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, server)?;
        info!("Reconnecting to {} with a fresh credential", server);
        self.store.remove(server)?;
        self.provision(server, false).await
    }

    async fn provision(
        &self,
        server: &ServerIdentity,
        force_reauth: bool,
    ) -> Result<Arc<StoredCredential>, RenewalError> {
        let session = match self.auth.discover_api(server, force_reauth).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Authorization for {} failed: {}", server, e);
                return Err(e.into());
            }
        };

        if session.credential.server != *server {
            warn!(
                "Provisioned credential is for {}, expected {}",
                session.credential.server, server
            );
            return Err(DiscoveryError::ProvisioningFailed(format!(
                "credential issued for {} instead of {}",
                session.credential.server, server
            ))
            .into());
        }

        let stored = self.store.replace(session)?;
        info!(
            "New credential for {} expires at {:?}",
            stored.server(),
            stored.expiry_time_millis()
        );
        Ok(stored)
    }
}
