//! Session engine
//!
//! Ties one server's credential, the tunnel observer, the expiry alarm and
//! renewal together, driven by UI lifecycle events:
//!
//! - `tick` (every second while visible): refresh telemetry and validity
//! - `on_pause`: plan and arm the background expiry alarm
//! - `on_resume`: cancel the alarm
//! - `renew` / `reconnect_to_instance`: re-provision the credential
//!
//! Outcomes that are not tied to a call (expiry, alarm, async failures) are
//! broadcast as [`SessionEvent`]s.

pub mod ticker;

pub use ticker::Ticker;

use crate::config::{ConfigError, SessionConfig};
use crate::connection::{ConnectionMonitor, ConnectionStatus, Observable, Tunnel};
use crate::credential::{CredentialStore, ServerIdentity, StoreError, StoredCredential};
use crate::discovery::{AuthorizationService, DiscoveryError};
use crate::expiry::{
    Alarm, AlarmCallback, ExpiryClock, ExpiryStatus, NotificationPolicy, ScheduleWindow,
    SchedulingError, classify_expiry,
};
use crate::renewal::{RenewGate, RenewalError, Renewer, can_renew_with};
use crate::time::Clock;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No credential saved for {0}")]
    NoCredential(ServerIdentity),
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
    #[error("Renewal failed: {0}")]
    Renewal(#[from] RenewalError),
    #[error("Scheduling failed: {0}")]
    Scheduling(#[from] SchedulingError),
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential passed its expiry; sent once per credential
    SessionExpired { server: ServerIdentity },
    /// The background expiry alarm went off
    ExpiryAlarm {
        server: ServerIdentity,
        status: ExpiryStatus,
    },
    AuthorizationFailed {
        server: ServerIdentity,
        message: String,
    },
    /// The alarm could not be armed; only the foreground tick is left
    SchedulingFailed { message: String },
    CredentialReplaced {
        server: ServerIdentity,
        expiry_time_millis: Option<i64>,
    },
}

const EVENT_CAPACITY: usize = 32;

/// Collaborators handed to [`SessionEngine::new`]
pub struct SessionParts {
    pub store: Arc<CredentialStore>,
    pub tunnel: Arc<dyn Tunnel>,
    pub auth: Arc<dyn AuthorizationService>,
    pub alarm: Arc<dyn Alarm>,
    pub clock: Arc<dyn Clock>,
}

pub struct SessionEngine {
    server: ServerIdentity,
    store: Arc<CredentialStore>,
    monitor: ConnectionMonitor,
    alarm: Arc<dyn Alarm>,
    clock: Arc<dyn Clock>,
    renewer: Renewer,
    policy: NotificationPolicy,
    renew_cooldown_millis: i64,
    tick_interval: Duration,
    expiry_clock: Mutex<ExpiryClock>,
    validity: Observable<ExpiryStatus>,
    can_renew: Observable<bool>,
    renew_gate: Mutex<Option<RenewGate>>,
    ticker: Mutex<Option<Ticker>>,
    events: broadcast::Sender<SessionEvent>,
    /// Handed to the alarm and ticker so neither keeps the engine alive
    weak_self: Weak<SessionEngine>,
}

impl SessionEngine {
    pub fn new(server: ServerIdentity, parts: SessionParts, config: &SessionConfig) -> Arc<Self> {
        let now = parts.clock.now_millis();
        let current = parts.store.get(&server);
        let validity = classify_expiry(now, current.as_ref().and_then(|c| c.expiry_time_millis()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let engine = Arc::new_cyclic(|weak_self| Self {
            monitor: ConnectionMonitor::new(parts.tunnel, now),
            renewer: Renewer::new(parts.auth, Arc::clone(&parts.store)),
            store: parts.store,
            alarm: parts.alarm,
            clock: parts.clock,
            policy: config.notification_policy(),
            renew_cooldown_millis: config.renew_cooldown_millis(),
            tick_interval: config.tick_interval(),
            expiry_clock: Mutex::new(ExpiryClock::new()),
            validity: Observable::new(validity),
            can_renew: Observable::new(false),
            renew_gate: Mutex::new(None),
            ticker: Mutex::new(None),
            events,
            weak_self: weak_self.clone(),
            server,
        });
        engine.reset_renew_gate(current.and_then(|c| c.authorized_at_millis()));
        info!("Session engine started for {}: {}", engine.server, validity.bucket);
        engine
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    /// Current credential snapshot, if any
    pub fn credential(&self) -> Option<Arc<StoredCredential>> {
        self.store.get(&self.server)
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    /// Refresh connection telemetry and the validity countdown
    ///
    /// Broadcasts [`SessionEvent::SessionExpired`] on the first tick that
    /// sees the current credential expired.
    pub fn tick(&self) -> ExpiryStatus {
        let now = self.clock.now_millis();
        self.monitor.refresh(now);

        // Snapshot under the lock so concurrent ticks classify generations in order
        let tick = {
            let mut expiry_clock = self.expiry_clock.lock().unwrap_or_else(PoisonError::into_inner);
            let credential = self.credential();
            expiry_clock.tick(now, credential.as_deref())
        };

        self.validity.set_if_changed(tick.status);
        if tick.session_expired {
            self.emit(SessionEvent::SessionExpired {
                server: self.server.clone(),
            });
        }
        tick.status
    }

    /// Going to the background: arm the expiry alarm
    ///
    /// Returns the armed window, or `None` when nothing needs scheduling or
    /// arming failed. A failure is broadcast as
    /// [`SessionEvent::SchedulingFailed`] and never escalated.
    pub fn on_pause(&self) -> Option<ScheduleWindow> {
        let now = self.clock.now_millis();
        let expiry = self.credential().and_then(|c| c.expiry_time_millis());
        let Some(window) = self.policy.plan(expiry, now, self.monitor.status()) else {
            debug!("No expiry alarm needed for {}", self.server);
            return None;
        };

        let engine = self.weak_self.clone();
        let callback: AlarmCallback = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.on_alarm();
            }
        });

        match self.alarm.arm(window, callback) {
            Ok(()) => Some(window),
            Err(e) => {
                warn!("Could not arm expiry alarm: {}", e);
                self.emit(SessionEvent::SchedulingFailed {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Back in the foreground: cancel the alarm and refresh
    pub fn on_resume(&self) -> ExpiryStatus {
        self.alarm.cancel();
        self.tick()
    }

    fn on_alarm(&self) {
        let status = self.tick();
        info!("Expiry alarm for {}: {}", self.server, status.bucket);
        self.emit(SessionEvent::ExpiryAlarm {
            server: self.server.clone(),
            status,
        });
    }

    /// Start the periodic tick; a no-op if it is already running
    pub fn start_ticker(&self) -> Result<(), SchedulingError> {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(Ticker::is_running) {
            return Ok(());
        }

        let engine = self.weak_self.clone();
        *ticker = Some(Ticker::spawn(self.tick_interval, move || {
            match engine.upgrade() {
                Some(engine) => {
                    engine.tick();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        })?);
        debug!("Ticker started ({}ms)", self.tick_interval.as_millis());
        Ok(())
    }

    /// Stop the periodic tick; leaves the alarm alone
    pub fn stop_ticker(&self) {
        if let Some(ticker) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ticker.cancel();
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Ticker::is_running)
    }

    /// Re-authorize and replace the credential
    pub async fn renew(&self) -> Result<Arc<StoredCredential>, RenewalError> {
        let result = self.renewer.renew(&self.server).await;
        self.finish_provisioning(result)
    }

    /// Discard the credential and provision a new one from scratch
    pub async fn reconnect_to_instance(&self) -> Result<Arc<StoredCredential>, RenewalError> {
        let result = self.renewer.reconnect_to_instance(&self.server).await;
        self.finish_provisioning(result)
    }

    fn finish_provisioning(
        &self,
        result: Result<Arc<StoredCredential>, RenewalError>,
    ) -> Result<Arc<StoredCredential>, RenewalError> {
        match &result {
            Ok(stored) => {
                self.emit(SessionEvent::CredentialReplaced {
                    server: self.server.clone(),
                    expiry_time_millis: stored.expiry_time_millis(),
                });
                self.reset_renew_gate(stored.authorized_at_millis());
            }
            Err(RenewalError::InProgress(_)) => {
                debug!("Provisioning for {} already running", self.server);
            }
            Err(e) => {
                self.emit(SessionEvent::AuthorizationFailed {
                    server: self.server.clone(),
                    message: e.to_string(),
                });
                // A failed reconnect has already dropped the credential
                if self.credential().is_none() {
                    self.reset_renew_gate(None);
                }
            }
        }
        self.tick();
        result
    }

    fn reset_renew_gate(&self, last_authorization_millis: Option<i64>) {
        let eligibility = can_renew_with(
            last_authorization_millis,
            self.clock.now_millis(),
            self.renew_cooldown_millis,
        );
        let mut gate = self.renew_gate.lock().unwrap_or_else(PoisonError::into_inner);
        // Abort the old flip before the new gate takes over the observable
        gate.take();
        *gate = Some(RenewGate::attach(eligibility, self.can_renew.clone()));
    }

    /// Forward a status change pushed by the transport
    pub fn handle_transition(&self, status: ConnectionStatus) {
        self.monitor.handle_transition(status, self.clock.now_millis());
    }

    pub fn disconnect(&self) {
        self.monitor.disconnect();
    }

    pub fn validity(&self) -> ExpiryStatus {
        self.validity.get()
    }

    pub fn subscribe_validity(&self) -> watch::Receiver<ExpiryStatus> {
        self.validity.subscribe()
    }

    /// Whether the manual renew action should be enabled
    pub fn can_renew(&self) -> bool {
        self.can_renew.get()
    }

    pub fn subscribe_can_renew(&self) -> watch::Receiver<bool> {
        self.can_renew.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event subscribers");
        }
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
