//! Certificate expiry tracking
//!
//! - `clock`: per-tick validity classification and the one-time
//!   session-expired signal
//! - `scheduler`: when the background expiry alarm should fire
//! - `alarm`: the injected one-shot alarm capability

pub mod alarm;
pub mod clock;
pub mod scheduler;

pub use alarm::{Alarm, AlarmCallback, SchedulingError, TokioAlarm};
pub use clock::{ExpiryClock, ExpiryStatus, ExpiryTick, ValidityBucket, classify_expiry};
pub use scheduler::{NotificationPolicy, ScheduleWindow, plan_notification};
