use std::sync::Arc;

use chrono::NaiveDate;

use crate::services::redis_handling::KvStore;
use crate::types::{CoreError, CoreResult, RATE_KEY, RATE_WINDOW_S, STATS_KEY};

pub const KIND_PROCESSED: &str = "processed";
pub const KIND_FAILED: &str = "failed";

// Buckets outlive their day so a late sweep still finds them.
const STATS_TTL_S: u64 = 2 * 24 * 3600;

/// Day-bucketed processed/failed counters maintained by the confirm
/// pipeline and read by the metrics surface.
#[derive(Clone)]
pub struct DailyCounters {
    store: Arc<dyn KvStore>,
}

impl DailyCounters {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        DailyCounters { store }
    }

    fn key(kind: &str, date: NaiveDate) -> String {
        format!("{STATS_KEY}:{kind}:{date}")
    }

    fn incr(&self, kind: &str) -> CoreResult<i64> {
        let today = chrono::Local::now().date_naive();
        self.store.incr_ex(&Self::key(kind, today), STATS_TTL_S)
    }

    pub fn incr_processed(&self) -> CoreResult<i64> {
        self.incr(KIND_PROCESSED)
    }

    pub fn incr_failed(&self) -> CoreResult<i64> {
        self.incr(KIND_FAILED)
    }

    pub fn get(&self, kind: &str, date: NaiveDate) -> CoreResult<i64> {
        let raw = self.store.get(&Self::key(kind, date))?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Daily boundary reset: drops the buckets of the given (past) day.
    pub fn sweep(&self, date: NaiveDate) -> CoreResult<()> {
        self.store.forget(&Self::key(KIND_PROCESSED, date))?;
        self.store.forget(&Self::key(KIND_FAILED, date))?;
        Ok(())
    }
}

/// Fixed-window request throttle keyed per phone or client IP.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        RateLimiter { store }
    }

    pub fn check(&self, scope: &str, id: &str, cap: i64) -> CoreResult<()> {
        let count = self
            .store
            .incr_ex(&format!("{RATE_KEY}:{scope}:{id}"), RATE_WINDOW_S)?;
        if count > cap {
            return Err(CoreError::Busy);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redis_handling::MemoryStore;

    #[test]
    fn counters_bucket_by_day_and_kind() {
        let counters = DailyCounters::new(Arc::new(MemoryStore::new()));
        let today = chrono::Local::now().date_naive();

        counters.incr_processed().unwrap();
        counters.incr_processed().unwrap();
        counters.incr_failed().unwrap();

        assert_eq!(counters.get(KIND_PROCESSED, today).unwrap(), 2);
        assert_eq!(counters.get(KIND_FAILED, today).unwrap(), 1);
    }

    #[test]
    fn sweep_resets_the_given_day_only() {
        let store = Arc::new(MemoryStore::new());
        let counters = DailyCounters::new(store);
        let today = chrono::Local::now().date_naive();

        counters.incr_processed().unwrap();
        counters.sweep(today.pred_opt().unwrap()).unwrap();
        assert_eq!(counters.get(KIND_PROCESSED, today).unwrap(), 1);

        counters.sweep(today).unwrap();
        assert_eq!(counters.get(KIND_PROCESSED, today).unwrap(), 0);
    }

    #[test]
    fn limiter_denies_past_the_cap() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        for _ in 0..3 {
            assert!(limiter.check("otp", "+35699000001", 3).is_ok());
        }
        assert!(matches!(
            limiter.check("otp", "+35699000001", 3),
            Err(CoreError::Busy)
        ));
        // Other identities are unaffected.
        assert!(limiter.check("otp", "+35699000002", 3).is_ok());
    }
}
