use crate::model::record::{RecordKey, TimeRecord};
use moka::sync::Cache;

/// Process-wide cache of today's records, keyed by (user, date).
///
/// Owned by the engine and injected at construction rather than living
/// in a module-level static, so tests get isolated instances. Entries
/// are populated lazily on first touch and only leave through
/// `invalidate`/`clear` (or the capacity bound). Reporting paths must
/// read the store, not this cache.
pub struct RecordCache {
    inner: Cache<RecordKey, TimeRecord>,
}

impl RecordCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    pub fn get(&self, key: &RecordKey) -> Option<TimeRecord> {
        self.inner.get(key)
    }

    pub fn insert(&self, record: TimeRecord) {
        self.inner.insert(record.key(), record);
    }

    pub fn invalidate(&self, key: &RecordKey) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(user_id: &str) -> TimeRecord {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        TimeRecord::new(user_id, "Test User", date, date.and_hms_opt(8, 0, 0).unwrap())
    }

    #[test]
    fn insert_then_get_round_trips() {
        let cache = RecordCache::new(100);
        let rec = record("u1");
        let key = rec.key();

        assert!(cache.get(&key).is_none());
        cache.insert(rec.clone());
        assert_eq!(cache.get(&key), Some(rec));
    }

    #[test]
    fn clear_empties_every_entry() {
        let cache = RecordCache::new(100);
        cache.insert(record("u1"));
        cache.insert(record("u2"));

        cache.clear();
        // moka applies invalidation lazily but reads must miss at once
        assert!(cache.get(&record("u1").key()).is_none());
        assert!(cache.get(&record("u2").key()).is_none());
    }
}
