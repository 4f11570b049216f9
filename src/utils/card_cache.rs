use crate::model::user::User;
use anyhow::Result;
use futures_util::StreamExt;
use moka::sync::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// Positive lookup cache: card UID -> resolved user. Negative answers
/// belong to the cuckoo filter, not here.
pub static CARD_CACHE: Lazy<Cache<String, User>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(3600)) // 1h TTL
        .build()
});

#[inline]
fn normalize(card_uid: &str) -> String {
    card_uid.trim().to_uppercase()
}

pub fn get(card_uid: &str) -> Option<User> {
    CARD_CACHE.get(&normalize(card_uid))
}

pub fn store(user: &User) {
    CARD_CACHE.insert(normalize(&user.card_uid), user.clone());
}

/// Drop a single entry (user deleted or card reassigned)
pub fn forget(card_uid: &str) {
    CARD_CACHE.invalidate(&normalize(card_uid));
}

/// Preload the whole directory into the lookup cache (batched). The
/// directory is small enough that a kiosk can carry all of it.
pub async fn warmup_card_cache(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, card_uid, department, email
        FROM users
        ORDER BY name
        "#,
    )
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let user: User = row?;
        batch.push(user);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_store(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        batch_store(&batch);
    }

    log::info!("Card cache warmup complete: {} users", total_count);

    Ok(())
}

fn batch_store(users: &[User]) {
    for user in users {
        store(user);
    }
}
