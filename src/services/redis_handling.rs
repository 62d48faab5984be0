use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{CoreError, CoreResult};

/// Key-value surface the core needs from redis: plain reads/writes with a
/// TTL, a set-if-absent for locks, and counters. `MemoryStore` implements
/// the same contract so unit tests can run without a redis instance.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> CoreResult<Option<String>>;
    fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<()>;
    /// Returns true when the key was absent and has been set.
    fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<bool>;
    fn forget(&self, key: &str) -> CoreResult<()>;
    fn forget_prefix(&self, prefix: &str) -> CoreResult<()>;
    /// Increments the key, attaching the TTL when the counter is created.
    fn incr_ex(&self, key: &str, ttl_s: u64) -> CoreResult<i64>;
}

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        RedisStore { client }
    }

    fn connection(&self) -> CoreResult<redis::Connection> {
        self.client
            .get_connection()
            .map_err(|_| CoreError::Infrastructure("failed to establish connection with redis".into()))
    }
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("GET").arg(key).query::<Option<String>>(&mut conn)?)
    }

    fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<()> {
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_s)
            .query::<()>(&mut conn)?;
        Ok(())
    }

    fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<bool> {
        let mut conn = self.connection()?;
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_s)
            .query::<Option<String>>(&mut conn)?;
        Ok(reply.is_some())
    }

    fn forget(&self, key: &str) -> CoreResult<()> {
        let mut conn = self.connection()?;
        redis::cmd("DEL").arg(key).query::<()>(&mut conn)?;
        Ok(())
    }

    fn forget_prefix(&self, prefix: &str) -> CoreResult<()> {
        let mut conn = self.connection()?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query(&mut conn)?;
        for key in keys {
            redis::cmd("DEL").arg(key).query::<()>(&mut conn)?;
        }
        Ok(())
    }

    fn incr_ex(&self, key: &str, ttl_s: u64) -> CoreResult<i64> {
        let mut conn = self.connection()?;
        let count: i64 = redis::cmd("INCR").arg(key).query(&mut conn)?;
        if count == 1 {
            redis::cmd("EXPIRE").arg(key).arg(ttl_s).query::<()>(&mut conn)?;
        }
        Ok(count)
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= Instant::now())
    }
}

/// In-process stand-in for redis, used by unit tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn entry(ttl_s: u64, value: &str) -> MemoryEntry {
        MemoryEntry {
            value: value.to_owned(),
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_s)),
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_owned(), Self::entry(ttl_s, value));
        Ok(())
    }

    fn set_nx_ex(&self, key: &str, value: &str, ttl_s: u64) -> CoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let occupied = entries.get(key).map(|e| !e.is_expired()).unwrap_or(false);
        if occupied {
            return Ok(false);
        }
        entries.insert(key.to_owned(), Self::entry(ttl_s, value));
        Ok(true)
    }

    fn forget(&self, key: &str) -> CoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn forget_prefix(&self, prefix: &str) -> CoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn incr_ex(&self, key: &str, ttl_s: u64) -> CoreResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.value.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;
        if current == 0 {
            entries.insert(key.to_owned(), Self::entry(ttl_s, &next.to_string()));
        } else if let Some(entry) = entries.get_mut(key) {
            entry.value = next.to_string();
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.forget("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn memory_store_expires_entries() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 0).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn set_nx_refuses_live_keys() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("lock", "a", 60).unwrap());
        assert!(!store.set_nx_ex("lock", "b", 60).unwrap());
        assert_eq!(store.get("lock").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn set_nx_reclaims_expired_keys() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("lock", "a", 0).unwrap());
        assert!(store.set_nx_ex("lock", "b", 60).unwrap());
    }

    #[test]
    fn forget_prefix_sweeps_matching_keys_only() {
        let store = MemoryStore::new();
        store.set_ex("availability:2025-06-01:19:00:2", "[]", 60).unwrap();
        store.set_ex("availability:2025-06-01:19:00:4", "[]", 60).unwrap();
        store.set_ex("booking_status:abc", "{}", 60).unwrap();
        store.forget_prefix("availability:2025-06-01:19:00").unwrap();
        assert_eq!(store.get("availability:2025-06-01:19:00:4").unwrap(), None);
        assert!(store.get("booking_status:abc").unwrap().is_some());
    }

    #[test]
    fn incr_counts_up_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_ex("c", 60).unwrap(), 1);
        assert_eq!(store.incr_ex("c", 60).unwrap(), 2);
        assert_eq!(store.incr_ex("c", 60).unwrap(), 3);
    }
}
