use crate::model::record::{
    format_clock, AttendanceAction, RecordKey, ScanResult, TimeRecord, TimeSlot,
};
use crate::store::cache::RecordCache;
use crate::store::{RecordStore, StoreError};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Attendance decision engine: the only writer of time records.
///
/// Every accepted scan runs load → guard → mutate-working-copy →
/// persist → swap-into-cache under a per-key async mutex, so the cache
/// never gets ahead of the store and two scans for the same (user, day)
/// cannot race past each other's idempotency guard.
pub struct AttendanceEngine {
    store: Arc<dyn RecordStore>,
    cache: RecordCache,
    locks: Mutex<HashMap<RecordKey, Arc<tokio::sync::Mutex<()>>>>,
    write_timeout: Duration,
    allow_auto_action: bool,
}

const SAVE_FAILED: &str = "Failed to save attendance record. Please try again or contact support.";

/// Prune the per-key lock map once it outgrows this; one entry accrues
/// per (user, day) otherwise.
const LOCK_MAP_PRUNE_THRESHOLD: usize = 1024;

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: RecordCache,
        write_timeout: Duration,
        allow_auto_action: bool,
    ) -> Self {
        Self {
            store,
            cache,
            locks: Mutex::new(HashMap::new()),
            write_timeout,
            allow_auto_action,
        }
    }

    /// Apply one explicit kiosk action for a resolved identity at `now`.
    ///
    /// Guard rejections come back as `success: false` values; only the
    /// store can turn an accepted action into a failure, and in that
    /// case the cache is left untouched.
    pub async fn record_action(
        &self,
        user_id: &str,
        user_name: &str,
        action: AttendanceAction,
        now: NaiveDateTime,
    ) -> ScanResult {
        let key = RecordKey::new(user_id, now.date());
        let key_lock = self.key_lock(&key);
        let _guard = key_lock.lock().await;

        let record = self
            .cache
            .get(&key)
            .unwrap_or_else(|| TimeRecord::new(user_id, user_name, now.date(), now));

        if !action.window().admits(now.hour()) {
            return ScanResult::rejected(action.window_rejection(user_name), user_name);
        }
        if record.slot(action).is_set() {
            return ScanResult::rejected(action.duplicate_rejection(user_name), user_name);
        }

        // Mutate a working copy; the cache only sees it once the store
        // has accepted the write.
        let mut updated = record;
        *updated.slot_mut(action) = TimeSlot::RecordedAt(now);
        updated.updated_at = now;

        if let Err(e) = self.persist(&updated).await {
            error!(error = %e, user_id, %action, "Record write failed; cache left unchanged");
            return ScanResult::rejected(SAVE_FAILED.to_string(), user_name);
        }

        let time = format_clock(now);
        info!(user_id, %action, %time, "Attendance recorded");
        let message = action.success_message(user_name, &time);
        self.cache.insert(updated);

        ScanResult::accepted(action, time, message, user_name)
    }

    /// Legacy scanner path: pick the next open slot for the current
    /// half-day when the kiosk sends no explicit action. Disabled
    /// unless the deployment opts in; new callers should always name
    /// the action.
    pub async fn record_auto(
        &self,
        user_id: &str,
        user_name: &str,
        now: NaiveDateTime,
    ) -> ScanResult {
        if !self.allow_auto_action {
            return ScanResult::rejected(
                format!("{}, please choose an action on the scanner.", user_name),
                user_name,
            );
        }

        let key = RecordKey::new(user_id, now.date());
        let record = self.cache.get(&key);
        let slot_open = |a: AttendanceAction| {
            record.as_ref().map_or(true, |r| !r.slot(a).is_set())
        };

        let next = if now.hour() < 12 {
            [AttendanceAction::TimeInAm, AttendanceAction::TimeOutAm]
        } else {
            [AttendanceAction::TimeInPm, AttendanceAction::TimeOutPm]
        }
        .into_iter()
        .find(|a| slot_open(*a));

        match next {
            Some(action) => self.record_action(user_id, user_name, action, now).await,
            None => ScanResult::rejected(
                format!("{}, you have completed your DTR for today.", user_name),
                user_name,
            ),
        }
    }

    /// Mark incomplete sessions on every record of `date`. Never touches
    /// a time slot, so running it twice is a no-op the second time.
    /// Each record is re-read under its key lock before mutation, so a
    /// scan accepted mid-pass cannot be overwritten by a stale row.
    pub async fn close_day(&self, date: NaiveDate, now: NaiveDateTime) -> Result<usize, StoreError> {
        let listed = self.store.read_by_date(date).await?;
        let mut flagged = 0usize;

        for stale in listed {
            let key = stale.key();
            let key_lock = self.key_lock(&key);
            let _guard = key_lock.lock().await;

            // The listing may predate an in-flight scan; the cache (or,
            // on a cold key, the store) holds the authoritative state.
            let was_cached = self.cache.get(&key);
            let record = match &was_cached {
                Some(r) => r.clone(),
                None => match self.store.read(&key).await? {
                    Some(r) => r,
                    None => continue, // deleted meanwhile
                },
            };

            let missed_am = Some(!record.am_complete());
            let missed_pm = Some(!record.pm_complete());
            if record.missed_am == missed_am && record.missed_pm == missed_pm {
                continue;
            }

            let mut updated = record;
            updated.missed_am = missed_am;
            updated.missed_pm = missed_pm;
            updated.updated_at = now;
            self.persist(&updated).await?;
            if was_cached.is_some() {
                self.cache.insert(updated);
            }
            flagged += 1;
        }

        info!(%date, flagged, "Day closed");
        Ok(flagged)
    }

    /// Whole-day delete for one user, serialized against scans for the
    /// same key; store first so the cache can only lag behind by
    /// holding nothing.
    pub async fn delete_day(&self, key: &RecordKey) -> Result<(), StoreError> {
        let key_lock = self.key_lock(key);
        let _guard = key_lock.lock().await;

        self.store.delete(key).await?;
        self.cache.invalidate(key);
        Ok(())
    }

    /// Admin reset: waits out in-flight scans by taking every known key
    /// lock, then store and cache are forgotten together.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let held: Vec<_> = {
            let locks = self.locks.lock().expect("lock map poisoned");
            locks.values().cloned().collect()
        };
        let mut guards = Vec::with_capacity(held.len());
        for lock in &held {
            guards.push(lock.lock().await);
        }

        self.store.delete_all().await?;
        self.cache.clear();
        drop(guards);
        self.locks.lock().expect("lock map poisoned").clear();
        warn!("All attendance records cleared");
        Ok(())
    }

    /// Reporting reads go to the store; the cache only answers for the
    /// live scan path.
    pub async fn all_records(&self) -> Result<Vec<TimeRecord>, StoreError> {
        self.store.read_all().await
    }

    pub async fn records_for(&self, date: NaiveDate) -> Result<Vec<TimeRecord>, StoreError> {
        self.store.read_by_date(date).await
    }

    fn key_lock(&self, key: &RecordKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        if locks.len() > LOCK_MAP_PRUNE_THRESHOLD {
            // anything nobody currently holds is safe to drop
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Bounded write: one timeout-guarded attempt, one retry. An
    /// unresponsive store must not hang the kiosk.
    async fn persist(&self, record: &TimeRecord) -> Result<(), StoreError> {
        let mut last_err = StoreError::Timeout;

        for attempt in 0..2 {
            match tokio::time::timeout(self.write_timeout, self.store.write(record)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    warn!(error = %e, attempt, user_id = %record.user_id, "Record write error");
                    last_err = e;
                }
                Err(_) => {
                    warn!(attempt, user_id = %record.user_id, "Record write timed out");
                    last_err = StoreError::Timeout;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MemStore {
        docs: Mutex<HashMap<RecordKey, TimeRecord>>,
        fail_writes: AtomicBool,
        /// When set, every write parks on `gate` until the test releases
        /// permits, letting a test freeze a writer mid-commit.
        stall_writes: AtomicBool,
        gate: tokio::sync::Semaphore,
    }

    impl MemStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                docs: Mutex::new(HashMap::new()),
                fail_writes: AtomicBool::new(false),
                stall_writes: AtomicBool::new(false),
                gate: tokio::sync::Semaphore::new(0),
            })
        }

        fn doc(&self, key: &RecordKey) -> Option<TimeRecord> {
            self.docs.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for MemStore {
        async fn write(&self, record: &TimeRecord) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout);
            }
            if self.stall_writes.load(Ordering::SeqCst) {
                self.gate.acquire().await.expect("gate closed").forget();
            }
            self.docs
                .lock()
                .unwrap()
                .insert(record.key(), record.clone());
            Ok(())
        }

        async fn read(&self, key: &RecordKey) -> Result<Option<TimeRecord>, StoreError> {
            Ok(self.doc(key))
        }

        async fn read_all(&self) -> Result<Vec<TimeRecord>, StoreError> {
            Ok(self.docs.lock().unwrap().values().cloned().collect())
        }

        async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TimeRecord>, StoreError> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.date == date)
                .cloned()
                .collect())
        }

        async fn delete(&self, key: &RecordKey) -> Result<(), StoreError> {
            self.docs.lock().unwrap().remove(key);
            Ok(())
        }

        async fn delete_all(&self) -> Result<(), StoreError> {
            self.docs.lock().unwrap().clear();
            Ok(())
        }
    }

    fn engine_with(store: Arc<MemStore>, auto: bool) -> AttendanceEngine {
        AttendanceEngine::new(
            store,
            RecordCache::new(1000),
            Duration::from_secs(1),
            auto,
        )
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn key() -> RecordKey {
        RecordKey::new("u1", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
    }

    #[tokio::test]
    async fn first_morning_scan_creates_record() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 15))
            .await;

        assert!(res.success);
        assert_eq!(res.action.as_deref(), Some("Time In AM"));
        assert_eq!(res.time.as_deref(), Some("08:15 AM"));
        assert!(res.message.contains("Welcome Ana"));

        let doc = store.doc(&key()).unwrap();
        assert_eq!(doc.time_in_am, TimeSlot::RecordedAt(at(8, 15)));
        assert!(!doc.time_out_am.is_set());
    }

    #[tokio::test]
    async fn repeated_action_is_rejected_and_record_unchanged() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 15))
            .await;
        let before = store.doc(&key()).unwrap();

        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(11, 50))
            .await;

        assert!(!res.success);
        assert!(res.message.contains("already timed in"));
        assert_eq!(store.doc(&key()).unwrap(), before);
    }

    #[tokio::test]
    async fn time_in_am_closed_from_noon_onward() {
        let engine = engine_with(MemStore::new(), false);

        for hour in [12, 15, 23] {
            let res = engine
                .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(hour, 0))
                .await;
            assert!(!res.success, "hour {} should reject Time In AM", hour);
        }
    }

    #[tokio::test]
    async fn time_in_pm_closed_before_noon() {
        let engine = engine_with(MemStore::new(), false);

        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInPm, at(11, 59))
            .await;
        assert!(!res.success);

        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInPm, at(12, 0))
            .await;
        assert!(res.success);
    }

    #[tokio::test]
    async fn time_out_am_allowed_without_time_in() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeOutAm, at(13, 5))
            .await;

        assert!(res.success);
        assert_eq!(res.time.as_deref(), Some("01:05 PM"));

        let doc = store.doc(&key()).unwrap();
        assert!(!doc.time_in_am.is_set());
        assert!(doc.time_out_am.is_set());
    }

    #[tokio::test]
    async fn pm_actions_leave_am_slots_alone() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInPm, at(13, 0))
            .await;

        let doc = store.doc(&key()).unwrap();
        assert_eq!(doc.time_in_am, TimeSlot::RecordedAt(at(8, 0)));
        assert_eq!(doc.time_in_pm, TimeSlot::RecordedAt(at(13, 0)));
        assert!(!doc.time_out_am.is_set());
    }

    #[tokio::test]
    async fn different_dates_get_distinct_records() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        let monday = at(8, 0);
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 11)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();

        let first = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, monday)
            .await;
        let second = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, tuesday)
            .await;

        assert!(first.success);
        assert!(second.success, "a new day must not trip the guard");
        assert_eq!(store.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn store_matches_cache_after_every_success() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        engine
            .record_action("u1", "Ana", AttendanceAction::TimeOutAm, at(11, 30))
            .await;

        let doc = store.doc(&key()).unwrap();
        assert_eq!(engine.cache.get(&key()), Some(doc));
    }

    // Regression guard: a failed write must not leave the cache ahead of
    // the store, and the same action must still be recordable afterwards.
    #[tokio::test]
    async fn failed_write_keeps_cache_clean() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        store.fail_writes.store(true, Ordering::SeqCst);
        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        assert!(!res.success);
        assert!(store.doc(&key()).is_none());
        assert!(engine.cache.get(&key()).is_none());

        store.fail_writes.store(false, Ordering::SeqCst);
        let retry = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 5))
            .await;
        assert!(retry.success, "retry after store recovery must succeed");
        assert_eq!(retry.time.as_deref(), Some("08:05 AM"));
    }

    #[tokio::test]
    async fn auto_action_requires_opt_in() {
        let engine = engine_with(MemStore::new(), false);

        let res = engine.record_auto("u1", "Ana", at(8, 0)).await;
        assert!(!res.success);
        assert!(res.message.contains("choose an action"));
    }

    #[tokio::test]
    async fn auto_action_walks_the_half_day_slots() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), true);

        let first = engine.record_auto("u1", "Ana", at(8, 0)).await;
        assert_eq!(first.action.as_deref(), Some("Time In AM"));

        let second = engine.record_auto("u1", "Ana", at(11, 30)).await;
        assert_eq!(second.action.as_deref(), Some("Time Out AM"));

        engine.record_auto("u1", "Ana", at(13, 0)).await;
        engine.record_auto("u1", "Ana", at(17, 0)).await;

        let done = engine.record_auto("u1", "Ana", at(17, 30)).await;
        assert!(!done.success);
        assert!(done.message.contains("completed your DTR"));
    }

    #[tokio::test]
    async fn close_day_flags_incomplete_sessions_once() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        engine
            .record_action("u1", "Ana", AttendanceAction::TimeOutAm, at(12, 0))
            .await;

        let flagged = engine.close_day(date, at(23, 0)).await.unwrap();
        assert_eq!(flagged, 1);

        let doc = store.doc(&key()).unwrap();
        assert_eq!(doc.missed_am, Some(false));
        assert_eq!(doc.missed_pm, Some(true));
        assert_eq!(doc.time_in_am, TimeSlot::RecordedAt(at(8, 0)));

        let again = engine.close_day(date, at(23, 30)).await.unwrap();
        assert_eq!(again, 0, "close_day must be idempotent");
    }

    // Regression guard: a day-close pass frozen inside its store write
    // holds the key lock, so a scan arriving meanwhile queues behind it
    // and its slot survives instead of being overwritten by the pass's
    // stale row.
    #[tokio::test]
    async fn close_day_cannot_erase_a_concurrent_scan() {
        let store = MemStore::new();
        let engine = Arc::new(AttendanceEngine::new(
            store.clone(),
            RecordCache::new(1000),
            Duration::from_secs(30),
            false,
        ));
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;

        store.stall_writes.store(true, Ordering::SeqCst);
        let closer = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.close_day(date, at(23, 0)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let scanner = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_action("u1", "Ana", AttendanceAction::TimeOutAm, at(11, 30))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            !scanner.is_finished(),
            "scan must queue behind the day-close pass"
        );

        store.gate.add_permits(16);
        assert_eq!(closer.await.unwrap().unwrap(), 1);
        assert!(scanner.await.unwrap().success);

        let doc = store.doc(&key()).unwrap();
        assert!(
            doc.time_out_am.is_set(),
            "scan recorded during day-close must survive"
        );
        assert_eq!(doc.time_in_am, TimeSlot::RecordedAt(at(8, 0)));
        assert_eq!(engine.cache.get(&key()).unwrap().time_out_am, doc.time_out_am);
    }

    #[tokio::test]
    async fn delete_day_queues_behind_in_flight_scan() {
        let store = MemStore::new();
        let engine = Arc::new(AttendanceEngine::new(
            store.clone(),
            RecordCache::new(1000),
            Duration::from_secs(30),
            false,
        ));

        store.stall_writes.store(true, Ordering::SeqCst);
        let scanner = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let deleter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.delete_day(&key()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            !deleter.is_finished(),
            "delete must wait for the scan to commit"
        );

        store.gate.add_permits(16);
        assert!(scanner.await.unwrap().success);
        deleter.await.unwrap().unwrap();

        assert!(store.doc(&key()).is_none());
        assert!(engine.cache.get(&key()).is_none());
    }

    #[tokio::test]
    async fn lock_map_is_pruned_as_days_accumulate() {
        let engine = engine_with(MemStore::new(), false);

        for day in 0..(LOCK_MAP_PRUNE_THRESHOLD as i64 + 200) {
            let now = at(8, 0) + chrono::Duration::days(day);
            let res = engine
                .record_action("u1", "Ana", AttendanceAction::TimeInAm, now)
                .await;
            assert!(res.success);
        }

        let len = engine.locks.lock().unwrap().len();
        assert!(
            len <= LOCK_MAP_PRUNE_THRESHOLD + 1,
            "lock map grew to {} entries",
            len
        );
    }

    #[tokio::test]
    async fn clear_all_forgets_store_and_cache_together() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        engine.clear_all().await.unwrap();

        assert!(store.read_all().await.unwrap().is_empty());
        assert!(engine.cache.get(&key()).is_none());

        // A fresh scan after the reset starts a brand new record.
        let res = engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(9, 0))
            .await;
        assert!(res.success);
    }

    #[tokio::test]
    async fn delete_day_drops_one_key_only() {
        let store = MemStore::new();
        let engine = engine_with(store.clone(), false);

        engine
            .record_action("u1", "Ana", AttendanceAction::TimeInAm, at(8, 0))
            .await;
        engine
            .record_action("u2", "Ben", AttendanceAction::TimeInAm, at(8, 1))
            .await;

        engine.delete_day(&key()).await.unwrap();

        assert!(store.doc(&key()).is_none());
        assert!(engine.cache.get(&key()).is_none());
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }
}
