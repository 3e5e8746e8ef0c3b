//! Observable values
//!
//! A value holder that pushes every update to its subscribers and replays
//! the latest value to anyone who subscribes late. Clones share the same
//! value.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Observable<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Latest value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publish a new value, even if nobody is listening
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Subscribe; the receiver starts out holding the latest value
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Publish only if the value differs from the current one
    ///
    /// Returns whether subscribers were notified.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
