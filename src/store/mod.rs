use crate::model::record::{RecordKey, TimeRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub mod cache;
pub mod sql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store write timed out")]
    Timeout,
}

/// Narrow contract over the backing document store. One document per
/// (user, date); `write` always replaces the whole document.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn write(&self, record: &TimeRecord) -> Result<(), StoreError>;

    async fn read(&self, key: &RecordKey) -> Result<Option<TimeRecord>, StoreError>;

    async fn read_all(&self) -> Result<Vec<TimeRecord>, StoreError>;

    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TimeRecord>, StoreError>;

    /// Whole-day delete; per-field deletion is deliberately not offered.
    async fn delete(&self, key: &RecordKey) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;
}
