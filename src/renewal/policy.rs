//! Renewal cooldown
//!
//! A session may be renewed manually once the cooldown since the last
//! authorization has passed. Until then the gate is closed and a single
//! delayed task opens it at exactly the right moment.

use crate::connection::Observable;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub const RENEW_COOLDOWN_MILLIS: i64 = 30 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewEligibility {
    Allowed,
    /// Allowed from `at_millis`, which is `delay` away
    NotBefore { at_millis: i64, delay: Duration },
}

impl RenewEligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Whether renewal is allowed at `now_millis`, with a custom cooldown
pub fn can_renew_with(
    last_authorization_millis: Option<i64>,
    now_millis: i64,
    cooldown_millis: i64,
) -> RenewEligibility {
    let Some(last) = last_authorization_millis else {
        return RenewEligibility::Allowed;
    };

    let at_millis = last.saturating_add(cooldown_millis);
    if now_millis >= at_millis {
        RenewEligibility::Allowed
    } else {
        RenewEligibility::NotBefore {
            at_millis,
            delay: Duration::from_millis(at_millis.saturating_sub(now_millis) as u64),
        }
    }
}

/// Whether renewal is allowed at `now_millis`
///
/// Without a prior authorization renewal is always allowed. Otherwise it
/// opens 30 minutes after the last authorization.
pub fn can_renew(last_authorization_millis: Option<i64>, now_millis: i64) -> RenewEligibility {
    can_renew_with(last_authorization_millis, now_millis, RENEW_COOLDOWN_MILLIS)
}

/// Observable "renew button enabled" flag
///
/// Flips from `false` to `true` at most once and never back. Dropping the
/// gate cancels a pending flip.
pub struct RenewGate {
    allowed: Observable<bool>,
    flip: Option<JoinHandle<()>>,
}

impl RenewGate {
    /// Must be called from within a tokio runtime when the cooldown has not
    /// passed yet; outside one, the gate opens immediately.
    pub fn new(eligibility: RenewEligibility) -> Self {
        Self::attach(eligibility, Observable::new(false))
    }

    /// Drive an existing observable, so subscribers survive a gate being
    /// replaced after re-authorization
    pub fn attach(eligibility: RenewEligibility, allowed: Observable<bool>) -> Self {
        let RenewEligibility::NotBefore { delay, .. } = eligibility else {
            allowed.set(true);
            return Self { allowed, flip: None };
        };

        allowed.set(false);
        let Ok(runtime) = Handle::try_current() else {
            debug!("No runtime to schedule the renew cooldown, allowing renewal");
            allowed.set(true);
            return Self { allowed, flip: None };
        };

        let opener = allowed.clone();
        let flip = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Renew cooldown passed");
            opener.set(true);
        });
        debug!("Renewal allowed in {}s", delay.as_secs());
        Self {
            allowed,
            flip: Some(flip),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.allowed.subscribe()
    }
}

impl Drop for RenewGate {
    fn drop(&mut self) {
        if let Some(flip) = self.flip.take() {
            flip.abort();
        }
    }
}
