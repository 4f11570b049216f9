use super::{RecordStore, StoreError};
use crate::model::record::{RecordKey, TimeRecord, TimeSlot};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// MySQL-backed record store. `time_records` carries one row per
/// (user_id, date) with a unique index on the pair, so the full-row
/// upsert below has document-overwrite semantics.
pub struct SqlRecordStore {
    pool: MySqlPool,
}

impl SqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Required columns fail loudly; time and flag columns degrade to
/// absent so one malformed legacy row cannot take down a whole report.
fn row_to_record(row: &MySqlRow) -> Result<TimeRecord, StoreError> {
    let slot = |name: &str| -> TimeSlot {
        TimeSlot::from(row.try_get::<Option<NaiveDateTime>, _>(name).unwrap_or(None))
    };

    let created_at: NaiveDateTime = row.try_get("created_at")?;

    Ok(TimeRecord {
        user_id: row.try_get("user_id")?,
        user_name: row.try_get("user_name")?,
        date: row.try_get("date")?,
        time_in_am: slot("time_in_am"),
        time_out_am: slot("time_out_am"),
        time_in_pm: slot("time_in_pm"),
        time_out_pm: slot("time_out_pm"),
        missed_am: row.try_get("missed_am").unwrap_or(None),
        missed_pm: row.try_get("missed_pm").unwrap_or(None),
        created_at,
        updated_at: row.try_get("updated_at").unwrap_or(created_at),
    })
}

const SELECT_COLUMNS: &str = r#"
    SELECT user_id, user_name, date,
           time_in_am, time_out_am, time_in_pm, time_out_pm,
           missed_am, missed_pm, created_at, updated_at
    FROM time_records
"#;

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn write(&self, record: &TimeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO time_records
                (user_id, user_name, date,
                 time_in_am, time_out_am, time_in_pm, time_out_pm,
                 missed_am, missed_pm, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                user_name = VALUES(user_name),
                time_in_am = VALUES(time_in_am),
                time_out_am = VALUES(time_out_am),
                time_in_pm = VALUES(time_in_pm),
                time_out_pm = VALUES(time_out_pm),
                missed_am = VALUES(missed_am),
                missed_pm = VALUES(missed_pm),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.user_name)
        .bind(record.date)
        .bind(record.time_in_am.as_datetime())
        .bind(record.time_out_am.as_datetime())
        .bind(record.time_in_pm.as_datetime())
        .bind(record.time_out_pm.as_datetime())
        .bind(record.missed_am)
        .bind(record.missed_pm)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read(&self, key: &RecordKey) -> Result<Option<TimeRecord>, StoreError> {
        let sql = format!("{} WHERE user_id = ? AND date = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(&key.user_id)
            .bind(key.date)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn read_all(&self) -> Result<Vec<TimeRecord>, StoreError> {
        let sql = format!("{} ORDER BY date, user_name", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TimeRecord>, StoreError> {
        let sql = format!("{} WHERE date = ? ORDER BY user_name", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).bind(date).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM time_records WHERE user_id = ? AND date = ?")
            .bind(&key.user_id)
            .bind(key.date)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM time_records")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
