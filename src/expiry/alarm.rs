//! One-shot wall-clock alarm
//!
//! Stands in for the platform alarm service. The engine gets an [`Alarm`]
//! injected; [`TokioAlarm`] is the in-process implementation.

use super::scheduler::ScheduleWindow;
use crate::time::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("No async runtime available to arm the alarm")]
    NoRuntime,
    #[error("Alarm rejected by platform: {0}")]
    Rejected(String),
}

pub type AlarmCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait Alarm: Send + Sync {
    /// Arm the alarm, replacing any alarm armed earlier
    fn arm(&self, window: ScheduleWindow, callback: AlarmCallback) -> Result<(), SchedulingError>;

    /// Cancel the armed alarm; a no-op if none is armed
    fn cancel(&self);

    fn is_armed(&self) -> bool;
}

/// Alarm backed by a spawned tokio task
pub struct TokioAlarm {
    clock: Arc<dyn Clock>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioAlarm {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(None),
        }
    }
}

impl Alarm for TokioAlarm {
    fn arm(&self, window: ScheduleWindow, callback: AlarmCallback) -> Result<(), SchedulingError> {
        let runtime = Handle::try_current().map_err(|_| SchedulingError::NoRuntime)?;

        let delay_millis = window.start_millis.saturating_sub(self.clock.now_millis()).max(0);
        if window.window_length_millis <= 0 {
            debug!(
                "Alarm window length {}ms, firing at window start",
                window.window_length_millis
            );
        }

        let task = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_millis as u64)).await;
            info!("Expiry alarm fired");
            callback();
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        info!("Expiry alarm armed, due in {}s", delay_millis / 1000);
        Ok(())
    }

    fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            if !task.is_finished() {
                debug!("Expiry alarm cancelled");
            }
            task.abort();
        }
    }

    fn is_armed(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TokioAlarm {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_callback(counter: &Arc<AtomicUsize>) -> AlarmCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn window(start_millis: i64) -> ScheduleWindow {
        ScheduleWindow {
            start_millis,
            window_length_millis: -1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_start() {
        let clock = ManualClock::new(10_000);
        let alarm = TokioAlarm::new(Arc::new(clock));
        let fired = Arc::new(AtomicUsize::new(0));

        alarm.arm(window(70_000), counter_callback(&fired)).unwrap();
        assert!(alarm.is_armed());

        tokio::time::sleep(Duration::from_millis(59_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!alarm.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let alarm = TokioAlarm::new(Arc::new(ManualClock::new(0)));
        let fired = Arc::new(AtomicUsize::new(0));

        alarm.arm(window(1_000), counter_callback(&fired)).unwrap();
        alarm.cancel();
        assert!(!alarm.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_when_not_armed_is_noop() {
        let alarm = TokioAlarm::new(Arc::new(ManualClock::new(0)));
        alarm.cancel();
        alarm.cancel();
        assert!(!alarm.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous() {
        let alarm = TokioAlarm::new(Arc::new(ManualClock::new(0)));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        alarm.arm(window(1_000), counter_callback(&first)).unwrap();
        alarm.arm(window(2_000), counter_callback(&second)).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_in_past_fires_immediately() {
        let alarm = TokioAlarm::new(Arc::new(ManualClock::new(50_000)));
        let fired = Arc::new(AtomicUsize::new(0));

        alarm.arm(window(10_000), counter_callback(&fired)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arm_without_runtime_fails() {
        let alarm = TokioAlarm::new(Arc::new(ManualClock::new(0)));
        let fired = Arc::new(AtomicUsize::new(0));
        let result = alarm.arm(window(1_000), counter_callback(&fired));
        assert!(matches!(result, Err(SchedulingError::NoRuntime)));
        assert!(!alarm.is_armed());
    }
}
