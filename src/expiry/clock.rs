//! Certificate validity countdown
//!
//! Turns (now, expiry) into a display bucket carrying the exact truncated
//! breakdown needed for pluralized rendering, plus whether the caller should
//! keep ticking.

use crate::credential::StoredCredential;
use std::fmt;
use tracing::info;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
/// Beyond this, only days are shown
const DAYS_ONLY_THRESHOLD: i64 = 30 * SECONDS_PER_DAY;

/// How much validity is left, at display granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityBucket {
    /// No key pair or no expiry known for the server
    NoCertificate,
    Expired,
    Seconds { seconds: i64 },
    MinutesSeconds { minutes: i64, seconds: i64 },
    HoursMinutes { hours: i64, minutes: i64 },
    DaysHours { days: i64, hours: i64 },
    DaysOnly { days: i64 },
}

impl ValidityBucket {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::NoCertificate | Self::Expired)
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

impl fmt::Display for ValidityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NoCertificate => f.write_str("No certificate"),
            Self::Expired => f.write_str("Expired"),
            Self::Seconds { seconds } => write!(f, "Valid for {}", plural(seconds, "second")),
            Self::MinutesSeconds { minutes, seconds } => write!(
                f,
                "Valid for {} and {}",
                plural(minutes, "minute"),
                plural(seconds, "second")
            ),
            Self::HoursMinutes { hours, minutes } => write!(
                f,
                "Valid for {} and {}",
                plural(hours, "hour"),
                plural(minutes, "minute")
            ),
            Self::DaysHours { days, hours } => write!(
                f,
                "Valid for {} and {}",
                plural(days, "day"),
                plural(hours, "hour")
            ),
            Self::DaysOnly { days } => write!(f, "Valid for {}", plural(days, "day")),
        }
    }
}

/// Result of one classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryStatus {
    pub bucket: ValidityBucket,
    /// `None` when no expiry is known
    pub remaining_seconds: Option<i64>,
    /// Whether the countdown should be re-evaluated on the next tick
    pub continue_ticking: bool,
}

impl ExpiryStatus {
    const NO_CERTIFICATE: Self = Self {
        bucket: ValidityBucket::NoCertificate,
        remaining_seconds: None,
        continue_ticking: false,
    };
}

/// Classify the remaining validity of a certificate
///
/// Remaining time is `(expiry - now) / 1000` with truncation toward zero, so
/// a certificate less than a second past its expiry still reads as
/// `Seconds { seconds: 0 }`. Differences beyond the `i64` range saturate.
pub fn classify_expiry(now_millis: i64, expiry_millis: Option<i64>) -> ExpiryStatus {
    let Some(expiry_millis) = expiry_millis else {
        return ExpiryStatus::NO_CERTIFICATE;
    };

    let remaining = expiry_millis.saturating_sub(now_millis) / 1000;
    let bucket = if remaining < 0 {
        ValidityBucket::Expired
    } else if remaining < SECONDS_PER_MINUTE {
        ValidityBucket::Seconds { seconds: remaining }
    } else if remaining < SECONDS_PER_HOUR {
        ValidityBucket::MinutesSeconds {
            minutes: remaining / SECONDS_PER_MINUTE,
            seconds: remaining % SECONDS_PER_MINUTE,
        }
    } else if remaining < SECONDS_PER_DAY {
        ValidityBucket::HoursMinutes {
            hours: remaining / SECONDS_PER_HOUR,
            minutes: remaining % SECONDS_PER_HOUR / SECONDS_PER_MINUTE,
        }
    } else if remaining < DAYS_ONLY_THRESHOLD {
        ValidityBucket::DaysHours {
            days: remaining / SECONDS_PER_DAY,
            hours: remaining % SECONDS_PER_DAY / SECONDS_PER_HOUR,
        }
    } else {
        ValidityBucket::DaysOnly {
            days: remaining / SECONDS_PER_DAY,
        }
    };

    ExpiryStatus {
        bucket,
        remaining_seconds: Some(remaining),
        continue_ticking: !bucket.is_terminal(),
    }
}

/// Outcome of one [`ExpiryClock::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryTick {
    pub status: ExpiryStatus,
    /// True on the first tick that sees this credential expired
    pub session_expired: bool,
}

/// Countdown that reports each credential's expiry exactly once
#[derive(Debug, Default)]
pub struct ExpiryClock {
    /// Generation of the credential whose expiry was already reported
    signalled_generation: Option<u64>,
}

impl ExpiryClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now_millis: i64, credential: Option<&StoredCredential>) -> ExpiryTick {
        let Some(credential) = credential else {
            return ExpiryTick {
                status: ExpiryStatus::NO_CERTIFICATE,
                session_expired: false,
            };
        };

        let status = classify_expiry(now_millis, credential.expiry_time_millis());
        let session_expired = status.bucket == ValidityBucket::Expired
            && self.signalled_generation != Some(credential.generation);
        if session_expired {
            info!("Certificate for {} has expired", credential.server());
            self.signalled_generation = Some(credential.generation);
        }

        ExpiryTick {
            status,
            session_expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, KeyPair};

    const NOW: i64 = 1_700_000_000_000;

    fn bucket_for_remaining(seconds: i64) -> ValidityBucket {
        classify_expiry(NOW, Some(NOW + seconds * 1000)).bucket
    }

    fn stored(expiry: Option<i64>, generation: u64) -> StoredCredential {
        StoredCredential {
            credential: Credential::new(
                "https://a.example/".into(),
                KeyPair {
                    certificate: "cert".to_string(),
                    private_key: "key".to_string(),
                    expiry_time_millis: expiry,
                },
            ),
            authorization: None,
            generation,
        }
    }

    #[test]
    fn test_no_expiry_is_no_certificate() {
        let status = classify_expiry(NOW, None);
        assert_eq!(status.bucket, ValidityBucket::NoCertificate);
        assert_eq!(status.remaining_seconds, None);
        assert!(!status.continue_ticking);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let status = classify_expiry(NOW, Some(i64::MIN));
        assert_eq!(status.bucket, ValidityBucket::Expired);
        assert!(!status.continue_ticking);

        let status = classify_expiry(NOW, Some(i64::MAX));
        assert!(matches!(status.bucket, ValidityBucket::DaysOnly { .. }));

        let status = classify_expiry(i64::MIN, Some(i64::MAX));
        assert_eq!(status.remaining_seconds, Some(i64::MAX / 1000));
        assert!(status.continue_ticking);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket_for_remaining(0), ValidityBucket::Seconds { seconds: 0 });
        assert_eq!(bucket_for_remaining(59), ValidityBucket::Seconds { seconds: 59 });
        assert_eq!(
            bucket_for_remaining(60),
            ValidityBucket::MinutesSeconds { minutes: 1, seconds: 0 }
        );
        assert_eq!(
            bucket_for_remaining(3599),
            ValidityBucket::MinutesSeconds { minutes: 59, seconds: 59 }
        );
        assert_eq!(
            bucket_for_remaining(3600),
            ValidityBucket::HoursMinutes { hours: 1, minutes: 0 }
        );
        assert_eq!(
            bucket_for_remaining(86_399),
            ValidityBucket::HoursMinutes { hours: 23, minutes: 59 }
        );
        assert_eq!(
            bucket_for_remaining(86_400),
            ValidityBucket::DaysHours { days: 1, hours: 0 }
        );
        assert_eq!(
            bucket_for_remaining(30 * 86_400 - 1),
            ValidityBucket::DaysHours { days: 29, hours: 23 }
        );
        assert_eq!(bucket_for_remaining(30 * 86_400), ValidityBucket::DaysOnly { days: 30 });
    }

    #[test]
    fn test_forty_five_seconds() {
        let status = classify_expiry(NOW, Some(NOW + 45_000));
        assert_eq!(status.bucket, ValidityBucket::Seconds { seconds: 45 });
        assert_eq!(status.remaining_seconds, Some(45));
        assert!(status.continue_ticking);
    }

    #[test]
    fn test_two_hours_one_minute_truncated() {
        // 7265s = 2h 1m 5s
        let status = classify_expiry(NOW, Some(NOW + 7_265_000));
        assert_eq!(status.bucket, ValidityBucket::HoursMinutes { hours: 2, minutes: 1 });
        assert_eq!(status.remaining_seconds, Some(7_265));
    }

    #[test]
    fn test_sub_second_remainders_truncate() {
        let status = classify_expiry(NOW, Some(NOW + 60_999));
        assert_eq!(status.bucket, ValidityBucket::MinutesSeconds { minutes: 1, seconds: 0 });

        // Less than a full second past expiry truncates to zero remaining
        let status = classify_expiry(NOW, Some(NOW - 999));
        assert_eq!(status.bucket, ValidityBucket::Seconds { seconds: 0 });
        assert!(status.continue_ticking);
    }

    #[test]
    fn test_expired_stops_ticking() {
        let status = classify_expiry(NOW, Some(NOW - 1_000));
        assert_eq!(status.bucket, ValidityBucket::Expired);
        assert_eq!(status.remaining_seconds, Some(-1));
        assert!(!status.continue_ticking);
    }

    #[test]
    fn test_not_expired_keeps_ticking_across_range() {
        for offset in [0, 1, 999, 1_000, 59_999, 3_600_000, 86_400_000, 40 * 86_400_000] {
            let status = classify_expiry(NOW, Some(NOW + offset));
            assert!(status.continue_ticking, "offset {}", offset);
            assert_ne!(status.bucket, ValidityBucket::Expired);
        }
    }

    #[test]
    fn test_display_pluralizes() {
        assert_eq!(ValidityBucket::Seconds { seconds: 1 }.to_string(), "Valid for 1 second");
        assert_eq!(
            ValidityBucket::MinutesSeconds { minutes: 2, seconds: 1 }.to_string(),
            "Valid for 2 minutes and 1 second"
        );
        assert_eq!(
            ValidityBucket::HoursMinutes { hours: 2, minutes: 1 }.to_string(),
            "Valid for 2 hours and 1 minute"
        );
        assert_eq!(
            ValidityBucket::DaysHours { days: 1, hours: 0 }.to_string(),
            "Valid for 1 day and 0 hours"
        );
        assert_eq!(ValidityBucket::DaysOnly { days: 45 }.to_string(), "Valid for 45 days");
        assert_eq!(ValidityBucket::Expired.to_string(), "Expired");
    }

    #[test]
    fn test_session_expired_fires_once_per_credential() {
        let mut clock = ExpiryClock::new();
        let expired = stored(Some(NOW - 5_000), 1);

        let first = clock.tick(NOW, Some(&expired));
        assert_eq!(first.status.bucket, ValidityBucket::Expired);
        assert!(first.session_expired);

        let second = clock.tick(NOW, Some(&expired));
        assert_eq!(second.status.bucket, ValidityBucket::Expired);
        assert!(!second.session_expired);

        // A new credential re-arms the signal
        let renewed_but_expired = stored(Some(NOW - 1_000), 2);
        assert!(clock.tick(NOW, Some(&renewed_but_expired)).session_expired);
    }

    #[test]
    fn test_session_expired_fires_on_crossing() {
        let mut clock = ExpiryClock::new();
        let credential = stored(Some(NOW + 2_000), 7);

        assert!(!clock.tick(NOW, Some(&credential)).session_expired);
        assert!(!clock.tick(NOW + 2_000, Some(&credential)).session_expired);
        assert!(clock.tick(NOW + 3_000, Some(&credential)).session_expired);
        assert!(!clock.tick(NOW + 4_000, Some(&credential)).session_expired);
    }

    #[test]
    fn test_tick_without_credential() {
        let mut clock = ExpiryClock::new();
        let tick = clock.tick(NOW, None);
        assert_eq!(tick.status.bucket, ValidityBucket::NoCertificate);
        assert!(!tick.session_expired);

        let tick = clock.tick(NOW, Some(&stored(None, 3)));
        assert_eq!(tick.status.bucket, ValidityBucket::NoCertificate);
    }
}
