use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::services::db_models::TableSummary;
use crate::services::redis_handling::KvStore;
use crate::types::{CoreResult, AVAILABILITY_CACHE_TTL_S, AVAILABILITY_KEY, MAX_PAX};

/// Short-TTL cache of availability results, keyed per date/time/pax.
#[derive(Clone)]
pub struct AvailabilityCache {
    store: Arc<dyn KvStore>,
}

impl AvailabilityCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        AvailabilityCache { store }
    }

    fn key(date: NaiveDate, time: NaiveTime, pax: i32) -> String {
        format!("{AVAILABILITY_KEY}:{date}:{}:{pax}", time.format("%H:%M"))
    }

    pub fn lookup(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        pax: i32,
    ) -> CoreResult<Option<Vec<TableSummary>>> {
        let Some(raw) = self.store.get(&Self::key(date, time, pax))? else {
            return Ok(None);
        };
        // A corrupt entry is treated as a miss and gets rewritten.
        Ok(serde_json::from_str(&raw).ok())
    }

    pub fn put(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        pax: i32,
        tables: &[TableSummary],
    ) -> CoreResult<()> {
        let raw = serde_json::to_string(tables)
            .map_err(|err| crate::types::CoreError::Infrastructure(err.to_string()))?;
        self.store
            .set_ex(&Self::key(date, time, pax), &raw, AVAILABILITY_CACHE_TTL_S)
    }

    /// Drops every pax variant for the slot. The same slot may have been
    /// queried under any party size, so the sweep covers the full 1..=20
    /// range instead of tracking which variants were actually cached.
    pub fn invalidate_slot(&self, date: NaiveDate, time: NaiveTime) -> CoreResult<()> {
        for pax in 1..=MAX_PAX {
            self.store.forget(&Self::key(date, time, pax))?;
        }
        Ok(())
    }

    pub fn clear_date(&self, date: NaiveDate) -> CoreResult<()> {
        self.store.forget_prefix(&format!("{AVAILABILITY_KEY}:{date}"))
    }

    pub fn clear_all(&self) -> CoreResult<()> {
        self.store.forget_prefix(&format!("{AVAILABILITY_KEY}:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redis_handling::MemoryStore;

    fn cache() -> AvailabilityCache {
        AvailabilityCache::new(Arc::new(MemoryStore::new()))
    }

    fn slot() -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    fn summaries() -> Vec<TableSummary> {
        vec![TableSummary { id: 7, name: "T7".into(), capacity: 4 }]
    }

    #[test]
    fn roundtrips_table_summaries() {
        let cache = cache();
        let (date, time) = slot();
        assert_eq!(cache.lookup(date, time, 4).unwrap(), None);
        cache.put(date, time, 4, &summaries()).unwrap();
        assert_eq!(cache.lookup(date, time, 4).unwrap(), Some(summaries()));
    }

    #[test]
    fn invalidation_sweeps_every_pax_variant() {
        let cache = cache();
        let (date, time) = slot();
        for pax in [1, 4, 20] {
            cache.put(date, time, pax, &summaries()).unwrap();
        }
        cache.invalidate_slot(date, time).unwrap();
        for pax in [1, 4, 20] {
            assert_eq!(cache.lookup(date, time, pax).unwrap(), None);
        }
    }

    #[test]
    fn invalidating_an_uncached_slot_is_a_noop() {
        let cache = cache();
        let (date, time) = slot();
        assert!(cache.invalidate_slot(date, time).is_ok());
    }

    #[test]
    fn clear_date_leaves_other_dates_alone() {
        let cache = cache();
        let (date, time) = slot();
        let other = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        cache.put(date, time, 2, &summaries()).unwrap();
        cache.put(other, time, 2, &summaries()).unwrap();
        cache.clear_date(date).unwrap();
        assert_eq!(cache.lookup(date, time, 2).unwrap(), None);
        assert!(cache.lookup(other, time, 2).unwrap().is_some());
    }
}
