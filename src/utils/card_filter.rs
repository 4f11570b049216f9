use anyhow::{anyhow, Result};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
/// Tune these based on the size of the card directory.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static CARD_FILTER: Lazy<RwLock<CuckooFilter<String>>> = Lazy::new(|| {
    RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE))
});

/// Card readers disagree on case and whitespace for hex UIDs.
#[inline]
fn normalize(card_uid: &str) -> String {
    card_uid.trim().to_uppercase()
}

/// Check if a card might be registered (false positives possible).
/// A negative answer is definitive and rejects the scan without a
/// database round trip.
pub fn might_exist(card_uid: &str) -> bool {
    let card_uid = normalize(card_uid);
    CARD_FILTER
        .read()
        .expect("card filter poisoned")
        .contains(&card_uid)
}

/// Insert a single card UID into the filter
pub fn insert(card_uid: &str) {
    let card_uid = normalize(card_uid);
    CARD_FILTER
        .write()
        .expect("card filter poisoned")
        .add(&card_uid);
}

/// Remove a card UID from the filter (user deleted / card reassigned)
pub fn remove(card_uid: &str) {
    let card_uid = normalize(card_uid);
    CARD_FILTER
        .write()
        .expect("card filter poisoned")
        .remove(&card_uid);
}

/// Warm up the card filter from the directory using streaming + batching
pub async fn warmup_card_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT card_uid FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (card_uid,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&card_uid));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Card filter warmup complete: {} cards", total);
    Ok(())
}

/// Insert a batch of normalized card UIDs
fn insert_batch(card_uids: &[String]) {
    let mut filter = CARD_FILTER.write().expect("card filter poisoned");

    for card_uid in card_uids {
        filter.add(card_uid);
    }
}
