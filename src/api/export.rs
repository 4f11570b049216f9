use crate::engine::AttendanceEngine;
use crate::model::record::TimeRecord;
use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Responder};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use utoipa::ToSchema;

const CSV_HEADER: &str = "Date,Name,Time In (AM),Time Out (AM),Time In (PM),Time Out (PM)";

/// Absent slots render as a dash so a spreadsheet row never looks
/// accidentally truncated.
const EMPTY_SLOT: &str = "-";

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportQuery {
    /// Month key, e.g. "2025-03"
    pub month: String,
}

fn parse_month(month: &str) -> Option<(i32, u32)> {
    let first_day = format!("{}-01", month);
    let date = NaiveDate::parse_from_str(&first_day, "%Y-%m-%d").ok()?;
    Some((date.year(), date.month()))
}

fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Build the monthly CSV: header always present, rows sorted by date
/// then user name.
pub fn build_monthly_csv(records: &[TimeRecord], year: i32, month: u32) -> String {
    let mut rows: Vec<&TimeRecord> = records
        .iter()
        .filter(|r| r.date.year() == year && r.date.month() == month)
        .collect();

    rows.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.user_name.to_lowercase().cmp(&b.user_name.to_lowercase()))
    });

    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for record in rows {
        let slot = |s: &crate::model::record::TimeSlot| {
            s.formatted().unwrap_or_else(|| EMPTY_SLOT.to_string())
        };
        let fields = [
            record.date.format("%m/%d/%Y").to_string(),
            record.user_name.clone(),
            slot(&record.time_in_am),
            slot(&record.time_out_am),
            slot(&record.time_in_pm),
            slot(&record.time_out_pm),
        ];

        let line: Vec<String> = fields.iter().map(|f| csv_quote(f)).collect();
        csv.push_str(&line.join(","));
        csv.push('\n');
    }

    csv
}

/// Export one month of records as CSV
#[utoipa::path(
    get,
    path = "/api/records/export",
    params(
        ("month" = String, Query, description = "Month key, e.g. 2025-03")
    ),
    responses(
        (status = 200, description = "CSV attachment; header-only when the month is empty"),
        (status = 400, description = "Malformed month key"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Records"
)]
pub async fn export_csv(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<ExportQuery>,
) -> actix_web::Result<impl Responder> {
    let Some((year, month)) = parse_month(query.month.trim()) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Month must be yyyy-mm"
        })));
    };

    // Fresh read from the store; the scan cache is not a reporting source.
    let records = engine.all_records().await.map_err(|e| {
        error!(error = %e, "Failed to fetch records for export");
        ErrorInternalServerError("Database error")
    })?;

    let csv = build_monthly_csv(&records, year, month);
    info!(month = %query.month, bytes = csv.len(), "Monthly CSV exported");

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"dtr-{}.csv\"", query.month.trim()),
        ))
        .body(csv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::TimeSlot;
    use chrono::NaiveDateTime;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(name: &str, day: u32) -> TimeRecord {
        let date = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        let mut r = TimeRecord::new("u1", name, date, dt(day, 8, 0));
        r.time_in_am = TimeSlot::RecordedAt(dt(day, 8, 15));
        r
    }

    #[test]
    fn empty_month_yields_header_only() {
        let csv = build_monthly_csv(&[], 2025, 3);
        assert_eq!(csv, format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn other_months_are_filtered_out() {
        let mut april = record("Ana", 10);
        april.date = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();

        let csv = build_monthly_csv(&[april], 2025, 3);
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn rows_sort_by_date_then_name() {
        let records = vec![record("zoe", 11), record("Ana", 11), record("Ben", 10)];
        let csv = build_monthly_csv(&records, 2025, 3);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("03/10/2025") && lines[1].contains("Ben"));
        assert!(lines[2].contains("Ana"));
        assert!(lines[3].contains("zoe"), "sort must ignore case");
    }

    #[test]
    fn absent_slots_render_as_dash() {
        let csv = build_monthly_csv(&[record("Ana", 10)], 2025, 3);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "\"03/10/2025\",\"Ana\",\"08:15 AM\",\"-\",\"-\",\"-\""
        );
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let csv = build_monthly_csv(&[record("Ana \"Ace\"", 10)], 2025, 3);
        assert!(csv.contains("\"Ana \"\"Ace\"\"\""));
    }

    #[test]
    fn month_key_parsing() {
        assert_eq!(parse_month("2025-03"), Some((2025, 3)));
        assert_eq!(parse_month("2025-13"), None);
        assert_eq!(parse_month("march"), None);
    }
}
