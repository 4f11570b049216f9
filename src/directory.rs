use crate::model::user::User;
use crate::utils::{card_cache, card_filter};
use sqlx::MySqlPool;
use tracing::debug;

/// User directory adapter: resolves a scanned card UID to a registered
/// identity. Consulted before every engine call; an absent result must
/// short-circuit at the caller, the engine never sees unresolved scans.
pub struct UserDirectory {
    pool: MySqlPool,
}

impl UserDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Three-tier lookup on the kiosk hot path:
    /// 1. cuckoo filter — definitive fast negative for unknown cards
    /// 2. moka cache — fast positive for recently seen cards
    /// 3. database fallback, which repopulates the cache on a hit
    pub async fn lookup_by_card(&self, card_uid: &str) -> anyhow::Result<Option<User>> {
        if !card_filter::might_exist(card_uid) {
            debug!(card_uid, "Card rejected by filter");
            return Ok(None);
        }

        if let Some(user) = card_cache::get(card_uid) {
            return Ok(Some(user));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, card_uid, department, email
            FROM users
            WHERE UPPER(card_uid) = UPPER(?)
            "#,
        )
        .bind(card_uid.trim())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref user) = user {
            card_cache::store(user);
        }

        Ok(user)
    }
}
