use thiserror::Error;

/// A booked slot occupies this many minutes starting at the requested time.
pub const BOOKING_DURATION_MIN: i64 = 105;

/// Largest party a single table may seat; also the upper bound of the
/// pax-variant sweep when invalidating availability cache keys.
pub const MAX_PAX: i32 = 20;

pub const AVAILABILITY_CACHE_TTL_S: u64 = 300;
pub const AVAILABILITY_KEY: &str = "availability";

pub const SLOT_LOCK_TTL_S: u64 = 10;
pub const SLOT_LOCK_KEY: &str = "reservation_lock";

pub const BOOKING_STATUS_TTL_S: u64 = 600;
pub const BOOKING_STATUS_KEY: &str = "booking_status";

pub const OTP_TTL_MIN: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i32 = 5;

pub const MAX_JOB_ATTEMPTS: u32 = 3;
pub const JOB_TIMEOUT_S: u64 = 30;
pub const JOB_RETRY_DELAY_MS: u64 = 500;

pub const STATS_KEY: &str = "stats";
pub const RATE_KEY: &str = "rate";
pub const RATE_WINDOW_S: u64 = 60;
pub const BOOKING_RATE_CAP: i64 = 5;
pub const OTP_RATE_CAP: i64 = 3;

/// Defaults used when the restaurant_settings row is absent.
pub const DEFAULT_OPENS_AT: &str = "12:00";
pub const DEFAULT_CLOSES_AT: &str = "22:00";
pub const DEFAULT_DEPOSIT_PER_PAX: i32 = 1000;
pub const DEFAULT_SLOT_INTERVAL_MIN: i32 = 30;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("busy, try again shortly")]
    Busy,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Infrastructure(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Only infrastructure failures are worth re-running a job for;
    /// everything else would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Infrastructure(_))
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => CoreError::NotFound("record not found".into()),
            other => CoreError::Infrastructure(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::Infrastructure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_errors_are_retryable() {
        assert!(CoreError::Infrastructure("queue down".into()).is_retryable());
        assert!(!CoreError::Validation("bad pax".into()).is_retryable());
        assert!(!CoreError::Conflict("slot taken".into()).is_retryable());
        assert!(!CoreError::Busy.is_retryable());
        assert!(!CoreError::NotFound("no session".into()).is_retryable());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: CoreError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
