//! Wall-clock planning of the "certificate about to expire" alarm

use crate::connection::ConnectionStatus;

/// Earliest the alarm may fire, relative to expiry
pub const MAX_LEAD_MILLIS: i64 = 30 * 60 * 1000;
/// Upper bound on the alarm's delivery window
pub const MAX_WINDOW_MILLIS: i64 = 15 * 60 * 1000;

/// When a one-shot alarm should fire
///
/// The alarm is due anywhere in `[start_millis, start_millis + window_length_millis]`.
/// `window_length_millis` is negative whenever it is planned before expiry;
/// alarm implementations treat a non-positive window as "fire at start".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start_millis: i64,
    pub window_length_millis: i64,
}

/// Constants feeding [`NotificationPolicy::plan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    pub max_lead_millis: i64,
    pub max_window_millis: i64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            max_lead_millis: MAX_LEAD_MILLIS,
            max_window_millis: MAX_WINDOW_MILLIS,
        }
    }
}

impl NotificationPolicy {
    /// Plan the expiry alarm, or `None` if there is nothing to warn about
    ///
    /// The window length is `min(now - expiry, max_window)`: elapsed time
    /// since expiry, not time remaining. Before expiry that is negative and
    /// is passed through unchanged.
    pub fn plan(
        &self,
        expiry_millis: Option<i64>,
        now_millis: i64,
        status: ConnectionStatus,
    ) -> Option<ScheduleWindow> {
        let expiry_millis = expiry_millis?;
        if status == ConnectionStatus::Disconnected {
            return None;
        }

        let start_millis = expiry_millis.saturating_sub(self.max_lead_millis).max(now_millis);
        let window_length_millis = now_millis.saturating_sub(expiry_millis).min(self.max_window_millis);
        Some(ScheduleWindow {
            start_millis,
            window_length_millis,
        })
    }
}

/// [`NotificationPolicy::plan`] with the default constants
pub fn plan_notification(
    expiry_millis: Option<i64>,
    now_millis: i64,
    status: ConnectionStatus,
) -> Option<ScheduleWindow> {
    NotificationPolicy::default().plan(expiry_millis, now_millis, status)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 60 * 60 * 1000;

    #[test]
    fn test_disconnected_never_plans() {
        for expiry in [None, Some(NOW - HOUR), Some(NOW), Some(NOW + HOUR)] {
            assert_eq!(plan_notification(expiry, NOW, ConnectionStatus::Disconnected), None);
        }
    }

    #[test]
    fn test_unknown_expiry_never_plans() {
        assert_eq!(plan_notification(None, NOW, ConnectionStatus::Connected), None);
    }

    #[test]
    fn test_far_expiry_starts_thirty_minutes_before() {
        let expiry = NOW + 2 * HOUR;
        let window = plan_notification(Some(expiry), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.start_millis, expiry - MAX_LEAD_MILLIS);
        // Literal formula: elapsed since expiry, negative before expiry
        assert_eq!(window.window_length_millis, -2 * HOUR);
    }

    #[test]
    fn test_near_expiry_starts_now() {
        let expiry = NOW + 10 * 60 * 1000;
        let window = plan_notification(Some(expiry), NOW, ConnectionStatus::Paused).unwrap();
        assert_eq!(window.start_millis, NOW);
        assert_eq!(window.window_length_millis, -10 * 60 * 1000);
    }

    #[test]
    fn test_after_expiry_window_is_capped() {
        let expiry = NOW - HOUR;
        let window = plan_notification(Some(expiry), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.start_millis, NOW);
        assert_eq!(window.window_length_millis, MAX_WINDOW_MILLIS);

        let expiry = NOW - 5 * 60 * 1000;
        let window = plan_notification(Some(expiry), NOW, ConnectionStatus::Failed).unwrap();
        assert_eq!(window.window_length_millis, 5 * 60 * 1000);
    }

    #[test]
    fn test_every_non_disconnected_status_plans() {
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Paused,
            ConnectionStatus::Failed,
        ] {
            assert!(plan_notification(Some(NOW + HOUR), NOW, status).is_some());
        }
    }

    #[test]
    fn test_extreme_expiry_saturates() {
        let window = plan_notification(Some(i64::MIN), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.start_millis, NOW);
        assert_eq!(window.window_length_millis, MAX_WINDOW_MILLIS);

        let window = plan_notification(Some(i64::MAX), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.start_millis, i64::MAX - MAX_LEAD_MILLIS);
        assert_eq!(window.window_length_millis, NOW - i64::MAX);
    }

    #[test]
    fn test_custom_policy() {
        let policy = NotificationPolicy {
            max_lead_millis: 60_000,
            max_window_millis: 1_000,
        };
        let window = policy.plan(Some(NOW + HOUR), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.start_millis, NOW + HOUR - 60_000);
        let window = policy.plan(Some(NOW - HOUR), NOW, ConnectionStatus::Connected).unwrap();
        assert_eq!(window.window_length_millis, 1_000);
    }
}
