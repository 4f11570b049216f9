use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A registered card holder. The core treats this as read-only input;
/// only the admin CRUD surface ever writes it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Unique identifier read off the RFID card.
    pub card_uid: String,
    pub department: Option<String>,
    pub email: Option<String>,
}
