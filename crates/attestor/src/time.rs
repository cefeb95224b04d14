//! Time utilities.
//!
//! Persisted artifacts carry RFC 3339 UTC timestamps; delegation JWTs
//! carry unix seconds.

use chrono::{DateTime, Duration, Utc};

use crate::error::{AttestorError, Result};

/// Current time as an RFC 3339 UTC string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Current time as unix seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// RFC 3339 string `days` days from now.
pub fn rfc3339_after_days(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

/// Unix seconds `hours` hours from now.
pub fn unix_after_hours(hours: i64) -> i64 {
    (Utc::now() + Duration::hours(hours)).timestamp()
}

/// Convert unix seconds to an RFC 3339 UTC string.
pub fn unix_to_rfc3339(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339()
}

/// Parse an RFC 3339 timestamp.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AttestorError::SerializationError(format!("invalid timestamp {s:?}: {e}")))
}

/// Is an RFC 3339 expiry timestamp still in the future?
///
/// Unparseable timestamps count as expired.
pub fn is_future(expires_at: &str) -> bool {
    parse_rfc3339(expires_at)
        .map(|dt| Utc::now() < dt)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_roundtrip() {
        let now = now_rfc3339();
        assert!(parse_rfc3339(&now).is_ok());
    }

    #[test]
    fn test_is_future() {
        assert!(is_future(&rfc3339_after_days(1)));
        assert!(!is_future(&rfc3339_after_days(-1)));
        assert!(!is_future("not-a-timestamp"));
    }

    #[test]
    fn test_unix_after_hours() {
        let now = now_unix();
        let later = unix_after_hours(24);
        assert_eq!(later - now, 24 * 3600);
    }

    #[test]
    fn test_unix_to_rfc3339() {
        let s = unix_to_rfc3339(0);
        assert!(s.starts_with("1970-01-01T00:00:00"));
    }
}
