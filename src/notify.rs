//! Native desktop notifications
//!
//! Used to tell the user a session is about to expire (or has) while the
//! client is in the background.

use crate::expiry::ValidityBucket;
use crate::session::SessionEvent;
use thiserror::Error;

#[cfg(not(target_os = "windows"))]
const APP_NAME: &str = "eduVPN";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to show notification: {0}")]
    ShowError(String),
}

/// Title and body for an event, or `None` if the event is not user-facing
pub fn describe_event(event: &SessionEvent) -> Option<(String, String)> {
    match event {
        SessionEvent::SessionExpired { server } => Some((
            "VPN session expired".to_string(),
            format!("Your session on {} has expired. Renew it to stay connected.", server),
        )),
        SessionEvent::ExpiryAlarm { server, status } => match status.bucket {
            ValidityBucket::NoCertificate => None,
            ValidityBucket::Expired => Some((
                "VPN session expired".to_string(),
                format!("Your session on {} has expired.", server),
            )),
            bucket => Some((
                "VPN session expires soon".to_string(),
                format!("{} ({}).", bucket, server),
            )),
        },
        SessionEvent::AuthorizationFailed { server, message } => Some((
            "Could not renew VPN session".to_string(),
            format!("{}: {}", server, message),
        )),
        SessionEvent::SchedulingFailed { .. } | SessionEvent::CredentialReplaced { .. } => None,
    }
}

/// Show a notification for `event` if it has one
pub fn notify_event(event: &SessionEvent) -> Result<(), NotifyError> {
    match describe_event(event) {
        Some((title, body)) => show(&title, &body),
        None => Ok(()),
    }
}

pub fn show(title: &str, body: &str) -> Result<(), NotifyError> {
    tracing::debug!("Notification: {}: {}", title, body);

    #[cfg(target_os = "windows")]
    return show_windows(title, body);

    #[cfg(not(target_os = "windows"))]
    return show_native(title, body);
}

#[cfg(target_os = "windows")]
fn show_windows(title: &str, body: &str) -> Result<(), NotifyError> {
    use tauri_winrt_notification::Toast;

    Toast::new(Toast::POWERSHELL_APP_ID)
        .title(title)
        .text1(body)
        .show()
        .map_err(|e| NotifyError::ShowError(e.to_string()))
}

#[cfg(not(target_os = "windows"))]
fn show_native(title: &str, body: &str) -> Result<(), NotifyError> {
    notify_rust::Notification::new()
        .appname(APP_NAME)
        .summary(title)
        .body(body)
        .show()
        .map(|_| ())
        .map_err(|e| NotifyError::ShowError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::ExpiryStatus;

    fn alarm(bucket: ValidityBucket) -> SessionEvent {
        SessionEvent::ExpiryAlarm {
            server: "https://vpn.example.org/".into(),
            status: ExpiryStatus {
                bucket,
                remaining_seconds: None,
                continue_ticking: !bucket.is_terminal(),
            },
        }
    }

    #[test]
    fn test_expiring_soon_mentions_remaining_time() {
        let (title, body) =
            describe_event(&alarm(ValidityBucket::MinutesSeconds { minutes: 12, seconds: 1 })).unwrap();
        assert_eq!(title, "VPN session expires soon");
        assert!(body.starts_with("Valid for 12 minutes and 1 second"));
    }

    #[test]
    fn test_expired_alarm() {
        let (title, _) = describe_event(&alarm(ValidityBucket::Expired)).unwrap();
        assert_eq!(title, "VPN session expired");
    }

    #[test]
    fn test_internal_events_are_silent() {
        assert!(describe_event(&alarm(ValidityBucket::NoCertificate)).is_none());
        assert!(
            describe_event(&SessionEvent::SchedulingFailed {
                message: "denied".to_string()
            })
            .is_none()
        );
    }
}
