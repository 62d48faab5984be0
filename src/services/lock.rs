use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::services::redis_handling::KvStore;
use crate::types::{CoreError, CoreResult, SLOT_LOCK_KEY, SLOT_LOCK_TTL_S};

/// Short-lived mutual exclusion for a table's slot, serializing the
/// check-then-create race at booking time. Acquisition is a single
/// non-blocking attempt; contenders are told to try again shortly.
#[derive(Clone)]
pub struct SlotLockManager {
    store: Arc<dyn KvStore>,
}

impl SlotLockManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        SlotLockManager { store }
    }

    fn key(table_id: i64, date: NaiveDate, time: NaiveTime) -> String {
        format!("{SLOT_LOCK_KEY}:{table_id}:{date}:{}", time.format("%H:%M"))
    }

    pub fn acquire(&self, table_id: i64, date: NaiveDate, time: NaiveTime) -> CoreResult<SlotLock> {
        let key = Self::key(table_id, date, time);
        let token = Uuid::new_v4().to_string();
        match self.store.set_nx_ex(&key, &token, SLOT_LOCK_TTL_S) {
            Ok(true) => Ok(SlotLock {
                store: self.store.clone(),
                key,
                token,
                released: false,
            }),
            Ok(false) => Err(CoreError::Busy),
            // An unreachable lock store must deny, not wave bookings
            // through unserialized.
            Err(_) => Err(CoreError::Busy),
        }
    }
}

/// Held lock; released explicitly or on drop, whichever comes first.
pub struct SlotLock {
    store: Arc<dyn KvStore>,
    key: String,
    token: String,
    released: bool,
}

impl SlotLock {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Only delete the key while it still carries our token; an expired
        // lock may have been re-acquired by someone else.
        match self.store.get(&self.key) {
            Ok(Some(holder)) if holder == self.token => {
                if let Err(err) = self.store.forget(&self.key) {
                    tracing::warn!(key = %self.key, %err, "failed to release slot lock");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(key = %self.key, %err, "failed to release slot lock"),
        }
    }
}

impl Drop for SlotLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redis_handling::MemoryStore;

    fn slot() -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    #[test]
    fn second_acquire_is_busy_until_release() {
        let manager = SlotLockManager::new(Arc::new(MemoryStore::new()));
        let (date, time) = slot();

        let held = manager.acquire(3, date, time).unwrap();
        assert!(matches!(manager.acquire(3, date, time), Err(CoreError::Busy)));

        held.release();
        assert!(manager.acquire(3, date, time).is_ok());
    }

    #[test]
    fn different_slots_do_not_contend() {
        let manager = SlotLockManager::new(Arc::new(MemoryStore::new()));
        let (date, time) = slot();
        let later = NaiveTime::from_hms_opt(21, 0, 0).unwrap();

        let _a = manager.acquire(3, date, time).unwrap();
        assert!(manager.acquire(4, date, time).is_ok());
        assert!(manager.acquire(3, date, later).is_ok());
    }

    #[test]
    fn dropping_the_guard_releases() {
        let manager = SlotLockManager::new(Arc::new(MemoryStore::new()));
        let (date, time) = slot();
        {
            let _held = manager.acquire(3, date, time).unwrap();
        }
        assert!(manager.acquire(3, date, time).is_ok());
    }

    #[test]
    fn exactly_one_of_many_contenders_wins() {
        let manager = SlotLockManager::new(Arc::new(MemoryStore::new()));
        let (date, time) = slot();

        let mut handles = vec![];
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(std::thread::spawn(move || {
                match manager.acquire(3, date, time) {
                    Ok(lock) => {
                        // Hold the lock for the thread's lifetime.
                        std::mem::forget(lock);
                        1
                    }
                    Err(_) => 0,
                }
            }));
        }
        let winners: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
    }

    struct DownStore;

    impl KvStore for DownStore {
        fn get(&self, _: &str) -> CoreResult<Option<String>> {
            Err(CoreError::Infrastructure("down".into()))
        }
        fn set_ex(&self, _: &str, _: &str, _: u64) -> CoreResult<()> {
            Err(CoreError::Infrastructure("down".into()))
        }
        fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> CoreResult<bool> {
            Err(CoreError::Infrastructure("down".into()))
        }
        fn forget(&self, _: &str) -> CoreResult<()> {
            Err(CoreError::Infrastructure("down".into()))
        }
        fn forget_prefix(&self, _: &str) -> CoreResult<()> {
            Err(CoreError::Infrastructure("down".into()))
        }
        fn incr_ex(&self, _: &str, _: u64) -> CoreResult<i64> {
            Err(CoreError::Infrastructure("down".into()))
        }
    }

    #[test]
    fn unavailable_store_fails_closed() {
        let manager = SlotLockManager::new(Arc::new(DownStore));
        let (date, time) = slot();
        assert!(matches!(manager.acquire(3, date, time), Err(CoreError::Busy)));
    }
}
