use crate::directory::UserDirectory;
use crate::engine::AttendanceEngine;
use crate::model::record::{AttendanceAction, ScanResult};
use crate::model::user::User;
use actix_web::{web, HttpResponse, Responder};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ScanRequest {
    #[schema(example = "04A2B9C1")]
    pub card_uid: String,
    /// One of the four kiosk actions. May only be omitted on legacy
    /// kiosks where auto-determination is enabled server-side.
    #[schema(example = "Time In AM", value_type = Option<String>)]
    pub action: Option<AttendanceAction>,
}

/// Kiosk scan endpoint
///
/// Always answers 200 with a `ScanResult`; the kiosk renders the
/// message whether the scan was accepted or not.
#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan processed; check `success`", body = ScanResult),
        (status = 400, description = "Empty card UID", body = Object, example = json!({
            "error": "card_uid must not be empty"
        }))
    ),
    tag = "Scanner"
)]
pub async fn scan(
    directory: web::Data<UserDirectory>,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let card_uid = payload.card_uid.trim();
    if card_uid.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "card_uid must not be empty"
        })));
    }

    // Directory first; unresolved cards never reach the engine.
    let user = match directory.lookup_by_card(card_uid).await {
        Ok(user) => user,
        Err(e) => {
            error!(error = %e, card_uid, "Card lookup failed");
            return Ok(HttpResponse::Ok().json(ScanResult::system_error()));
        }
    };

    let now = Local::now().naive_local();
    let result = dispatch_scan(user, payload.action, engine.get_ref(), now).await;

    Ok(HttpResponse::Ok().json(result))
}

/// Route a resolved (or unresolved) card to the engine. Separated from
/// the HTTP shell so the unregistered-card short-circuit is testable
/// without a database.
pub(crate) async fn dispatch_scan(
    user: Option<User>,
    action: Option<AttendanceAction>,
    engine: &AttendanceEngine,
    now: NaiveDateTime,
) -> ScanResult {
    let Some(user) = user else {
        return ScanResult::unregistered_card();
    };

    match action {
        Some(action) => engine.record_action(&user.id, &user.name, action, now).await,
        None => engine.record_auto(&user.id, &user.name, now).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{RecordKey, TimeRecord};
    use crate::store::cache::RecordCache;
    use crate::store::{RecordStore, StoreError};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingStore {
        writes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RecordStore for CountingStore {
        async fn write(&self, _record: &TimeRecord) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read(&self, _key: &RecordKey) -> Result<Option<TimeRecord>, StoreError> {
            Ok(None)
        }

        async fn read_all(&self) -> Result<Vec<TimeRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn read_by_date(&self, _date: NaiveDate) -> Result<Vec<TimeRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _key: &RecordKey) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_all(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn engine_over(store: Arc<CountingStore>) -> AttendanceEngine {
        AttendanceEngine::new(store, RecordCache::new(100), Duration::from_secs(1), false)
    }

    fn morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_card_never_reaches_the_engine() {
        let store = Arc::new(CountingStore::default());
        let engine = engine_over(store.clone());

        let res = dispatch_scan(None, Some(AttendanceAction::TimeInAm), &engine, morning()).await;

        assert!(!res.success);
        assert_eq!(
            res.message,
            "Unregistered RFID card. Please contact administrator."
        );
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolved_card_dispatches_to_the_engine() {
        let store = Arc::new(CountingStore::default());
        let engine = engine_over(store.clone());
        let user = User {
            id: "u1".into(),
            name: "Ana".into(),
            card_uid: "04A2B9C1".into(),
            department: None,
            email: None,
        };

        let res = dispatch_scan(Some(user), Some(AttendanceAction::TimeInAm), &engine, morning()).await;

        assert!(res.success);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }
}
