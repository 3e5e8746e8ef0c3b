//! Tunnel observer with connection-gated telemetry
//!
//! The monitor never drives the tunnel. It records the transitions the
//! transport reports and, on every tick, republishes the derived values:
//!
//! - connected duration: only updated while `Connected`; the counter
//!   restarts from zero on the next connect, the last published value is
//!   held in between
//! - byte counters and assigned addresses: passed through while
//!   `Connected`, zero/empty otherwise

use super::observable::Observable;
use super::status::ConnectionStatus;
use super::{AssignedIps, ByteCount, Tunnel};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct MonitorState {
    status: ConnectionStatus,
    connected_at_millis: Option<i64>,
}

pub struct ConnectionMonitor {
    tunnel: Arc<dyn Tunnel>,
    state: Mutex<MonitorState>,
    status: Observable<ConnectionStatus>,
    connected_seconds: Observable<u64>,
    byte_count: Observable<ByteCount>,
    assigned_ips: Observable<AssignedIps>,
}

impl ConnectionMonitor {
    pub fn new(tunnel: Arc<dyn Tunnel>, now_millis: i64) -> Self {
        let initial = tunnel.status();
        let monitor = Self {
            tunnel,
            state: Mutex::new(MonitorState::default()),
            status: Observable::new(ConnectionStatus::Disconnected),
            connected_seconds: Observable::new(0),
            byte_count: Observable::default(),
            assigned_ips: Observable::default(),
        };
        monitor.handle_transition(initial, now_millis);
        monitor
    }

    /// Record a status change pushed by the transport
    pub fn handle_transition(&self, status: ConnectionStatus, now_millis: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.apply_transition(&mut state, status, now_millis);
    }

    /// Tick handler: resync with the transport and republish derived values
    pub fn refresh(&self, now_millis: i64) {
        let reported = self.tunnel.status();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if reported != state.status {
            debug!("Transport reports {} without a pushed transition", reported);
            self.apply_transition(&mut state, reported, now_millis);
        }

        if let Some(connected_at) = state.connected_at_millis {
            let elapsed = now_millis.saturating_sub(connected_at).max(0) / 1000;
            self.connected_seconds.set_if_changed(elapsed as u64);
            self.publish_telemetry();
        }
    }

    // Publishes while the state lock is held, so pushes and ticks reach
    // subscribers in the order they were applied.
    fn apply_transition(&self, state: &mut MonitorState, status: ConnectionStatus, now_millis: i64) {
        let previous = state.status;
        if previous == status {
            return;
        }
        state.status = status;
        state.connected_at_millis = status.is_connected().then_some(now_millis);

        info!("Connection status: {} -> {}", previous, status);
        match status {
            ConnectionStatus::Connected => {
                self.connected_seconds.set(0);
                self.publish_telemetry();
            }
            ConnectionStatus::Failed => {
                warn!(
                    "Tunnel failed: {}",
                    self.tunnel.error_string().unwrap_or_else(|| "unknown error".to_string())
                );
                self.clear_telemetry();
            }
            _ => self.clear_telemetry(),
        }
        self.status.set(status);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    /// Seconds spent connected in the current session (last value held
    /// while not connected)
    pub fn connected_seconds(&self) -> u64 {
        self.connected_seconds.get()
    }

    pub fn byte_count(&self) -> ByteCount {
        self.byte_count.get()
    }

    pub fn assigned_ips(&self) -> AssignedIps {
        self.assigned_ips.get()
    }

    /// Why the tunnel failed; `None` unless the status is `Failed`
    pub fn error_string(&self) -> Option<String> {
        if self.status() == ConnectionStatus::Failed {
            self.tunnel.error_string()
        } else {
            None
        }
    }

    pub fn protocol_name(&self) -> &str {
        self.tunnel.protocol_name()
    }

    /// Ask the transport to tear down the tunnel
    pub fn disconnect(&self) {
        info!("Disconnecting {} tunnel", self.tunnel.protocol_name());
        self.tunnel.disconnect();
        self.clear_telemetry();
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_connected_seconds(&self) -> watch::Receiver<u64> {
        self.connected_seconds.subscribe()
    }

    pub fn subscribe_byte_count(&self) -> watch::Receiver<ByteCount> {
        self.byte_count.subscribe()
    }

    pub fn subscribe_assigned_ips(&self) -> watch::Receiver<AssignedIps> {
        self.assigned_ips.subscribe()
    }

    fn publish_telemetry(&self) {
        self.byte_count.set_if_changed(self.tunnel.byte_count());
        self.assigned_ips.set_if_changed(self.tunnel.assigned_ips());
    }

    fn clear_telemetry(&self) {
        self.byte_count.set_if_changed(ByteCount::default());
        self.assigned_ips.set_if_changed(AssignedIps::default());
    }
}
