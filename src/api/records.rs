use crate::engine::AttendanceEngine;
use crate::model::record::{RecordKey, TimeRecord};
use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Responder};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

/// Admin-facing view of a daily record. Times are pre-rendered in the
/// fixed 12-hour format the dashboard shows.
#[derive(Serialize, ToSchema)]
pub struct RecordResponse {
    pub user_id: String,
    pub user_name: String,
    #[schema(example = "2025-03-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "08:15 AM")]
    pub time_in_am: Option<String>,
    pub time_out_am: Option<String>,
    pub time_in_pm: Option<String>,
    pub time_out_pm: Option<String>,
    pub missed_am: Option<bool>,
    pub missed_pm: Option<bool>,
}

impl From<TimeRecord> for RecordResponse {
    fn from(record: TimeRecord) -> Self {
        Self {
            user_id: record.user_id,
            user_name: record.user_name,
            date: record.date,
            time_in_am: record.time_in_am.formatted(),
            time_out_am: record.time_out_am.formatted(),
            time_in_pm: record.time_in_pm.formatted(),
            time_out_pm: record.time_out_pm.formatted(),
            missed_am: record.missed_am,
            missed_pm: record.missed_pm,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RecordListResponse {
    pub data: Vec<RecordResponse>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordQuery {
    /// Restrict to one calendar date (yyyy-mm-dd)
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct CloseDayRequest {
    #[schema(example = "2025-03-10", format = "date", value_type = String)]
    pub date: NaiveDate,
}

/// List time records
///
/// Always reads the store, never the scan-path cache, so the dashboard
/// sees exactly what is persisted.
#[utoipa::path(
    get,
    path = "/api/records",
    params(
        ("date" = Option<String>, Query, description = "Restrict to one calendar date (yyyy-mm-dd)")
    ),
    responses(
        (status = 200, description = "Time records", body = RecordListResponse),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Records"
)]
pub async fn list_records(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    let records = match query.date {
        Some(date) => engine.records_for(date).await,
        None => engine.all_records().await,
    }
    .map_err(|e| {
        error!(error = %e, "Failed to fetch records");
        ErrorInternalServerError("Database error")
    })?;

    let data: Vec<RecordResponse> = records.into_iter().map(RecordResponse::from).collect();
    let total = data.len();

    Ok(HttpResponse::Ok().json(RecordListResponse { data, total }))
}

/// Delete one user's record for one day
#[utoipa::path(
    delete,
    path = "/api/records/{user_id}/{date}",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("date" = String, Path, description = "Calendar date (yyyy-mm-dd)")
    ),
    responses(
        (status = 200, description = "Record deleted"),
        (status = 400, description = "Malformed date"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Records"
)]
pub async fn delete_record(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(String, String)>,
) -> actix_web::Result<impl Responder> {
    let (user_id, date) = path.into_inner();

    let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Date must be yyyy-mm-dd"
        })));
    };

    engine
        .delete_day(&RecordKey::new(user_id, date))
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to delete record");
            ErrorInternalServerError("Database error")
        })?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Record deleted" })))
}

/// Clear every time record (admin reset)
#[utoipa::path(
    delete,
    path = "/api/records",
    responses(
        (status = 200, description = "All records cleared"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Records"
)]
pub async fn clear_records(
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    engine.clear_all().await.map_err(|e| {
        error!(error = %e, "Failed to clear records");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(json!({ "message": "All records cleared" })))
}

/// Mark incomplete AM/PM sessions for a finished day
#[utoipa::path(
    post,
    path = "/api/records/close-day",
    request_body = CloseDayRequest,
    responses(
        (status = 200, description = "Day closed", body = Object, example = json!({
            "flagged": 3
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Records"
)]
pub async fn close_day(
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<CloseDayRequest>,
) -> actix_web::Result<impl Responder> {
    let now = Local::now().naive_local();

    let flagged = engine.close_day(payload.date, now).await.map_err(|e| {
        error!(error = %e, date = %payload.date, "Failed to close day");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(json!({ "flagged": flagged })))
}
