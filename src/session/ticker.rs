//! Repeating UI tick
//!
//! Runs a callback on a fixed period until cancelled or until the callback
//! asks to stop. Ticks missed while the runtime was busy are skipped rather
//! than replayed in a burst.

use crate::expiry::SchedulingError;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub struct Ticker {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking; the first tick fires immediately
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Result<Self, SchedulingError>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| SchedulingError::NoRuntime)?;
        let (cancel, mut cancelled) = watch::channel(false);

        let task = runtime.spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        if on_tick().is_break() {
                            debug!("Ticker stopped by its callback");
                            break;
                        }
                    }
                    // Also fires when the sender is dropped
                    _ = cancelled.changed() => {
                        debug!("Ticker cancelled");
                        break;
                    }
                }
            }
        });

        Ok(Self { cancel, task })
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> ControlFlow<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::spawn(Duration::from_secs(1), counting(&counter)).unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        // Immediate first tick plus one per elapsed second
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticking() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::spawn(Duration::from_secs(1), counting(&counter)).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        ticker.cancel();
        ticker.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_ticker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let ticker = Ticker::spawn(Duration::from_secs(1), move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!ticker.is_running());
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let result = Ticker::spawn(Duration::from_secs(1), || ControlFlow::Continue(()));
        assert!(matches!(result, Err(SchedulingError::NoRuntime)));
    }
}
