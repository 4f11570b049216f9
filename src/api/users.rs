use crate::model::user::User;
use crate::utils::{card_cache, card_filter};
use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct RegisterUser {
    #[schema(example = "Ana Reyes")]
    pub name: String,
    #[schema(example = "04A2B9C1")]
    pub card_uid: String,
    #[schema(example = "Registrar")]
    pub department: Option<String>,
    #[schema(example = "ana@school.edu", format = "email")]
    pub email: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserQuery {
    /// Match against name or card UID
    pub search: Option<String>,
}

/// true  => card UID is free to register
/// false => card UID already belongs to a user
pub async fn is_card_available(card_uid: &str, pool: &MySqlPool) -> bool {
    // 1. Cuckoo filter — fast definitive negative
    if !card_filter::might_exist(card_uid) {
        return true;
    }

    // 2. Moka cache — fast positive
    if card_cache::get(card_uid).is_some() {
        return false;
    }

    // 3. Database fallback
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE UPPER(card_uid) = UPPER(?) LIMIT 1)",
    )
    .bind(card_uid.trim())
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    !exists
}

/// Register a user against a card
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "User registered", body = User),
        (status = 400, description = "Missing name or card UID"),
        (status = 409, description = "Card already registered", body = Object, example = json!({
            "error": "Card is already registered to another user"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn register_user(
    pool: web::Data<MySqlPool>,
    payload: web::Json<RegisterUser>,
) -> impl Responder {
    let name = payload.name.trim();
    let card_uid = payload.card_uid.trim().to_uppercase();

    if name.is_empty() || card_uid.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Name and card UID must not be empty"
        }));
    }

    if !is_card_available(&card_uid, pool.get_ref()).await {
        return HttpResponse::Conflict().json(json!({
            "error": "Card is already registered to another user"
        }));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        card_uid: card_uid.clone(),
        department: payload.department.clone().filter(|d| !d.trim().is_empty()),
        email: payload.email.clone().filter(|e| !e.trim().is_empty()),
    };

    let result = sqlx::query(
        r#"INSERT INTO users (id, name, card_uid, department, email) VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.card_uid)
    .bind(&user.department)
    .bind(&user.email)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            // keep the filter and lookup cache ahead of the next scan
            card_filter::insert(&user.card_uid);
            card_cache::store(&user);
            info!(user_id = %user.id, card_uid = %user.card_uid, "User registered");
            HttpResponse::Created().json(user)
        }
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return HttpResponse::Conflict().json(json!({
                        "error": "Card is already registered to another user"
                    }));
                }
            }

            error!(error = %e, "Failed to register user");
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            }))
        }
    }
}

/// List registered users
#[utoipa::path(
    get,
    path = "/api/users",
    params(
        ("search" = Option<String>, Query, description = "Match against name or card UID")
    ),
    responses(
        (status = 200, description = "Registered users", body = [User])
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> actix_web::Result<impl Responder> {
    let users = match &query.search {
        Some(search) => {
            let like = format!("%{}%", search.trim());
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, name, card_uid, department, email
                FROM users
                WHERE name LIKE ? OR card_uid LIKE ?
                ORDER BY name
                "#,
            )
            .bind(&like)
            .bind(&like)
            .fetch_all(pool.get_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, User>(
                "SELECT id, name, card_uid, department, email FROM users ORDER BY name",
            )
            .fetch_all(pool.get_ref())
            .await
        }
    }
    .map_err(|e| {
        error!(error = %e, "Failed to list users");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(users))
}

/// Get one user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, card_uid, department, email FROM users WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = %id, "Failed to fetch user");
        ErrorInternalServerError("Database error")
    })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Ok(HttpResponse::NotFound().json(json!({ "error": "User not found" }))),
    }
}

/// Update a user's profile fields. The card UID is immutable; reassign
/// a card by deleting and re-registering.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<UpdateUser>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let affected = sqlx::query(
        r#"
        UPDATE users
        SET name = COALESCE(?, name),
            department = COALESCE(?, department),
            email = COALESCE(?, email)
        WHERE id = ?
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.department)
    .bind(&payload.email)
    .bind(&id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = %id, "Failed to update user");
        ErrorInternalServerError("Database error")
    })?
    .rows_affected();

    if affected == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "User not found" })));
    }

    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, card_uid, department, email FROM users WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = %id, "Failed to re-read user after update");
        ErrorInternalServerError("Database error")
    })?;

    // refresh the scan-path lookup cache with the new name
    card_cache::store(&user);

    Ok(HttpResponse::Ok().json(user))
}

/// Delete a user and release their card
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = Object, example = json!({
            "message": "User deleted"
        })),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let card_uid = sqlx::query_scalar::<_, String>("SELECT card_uid FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %id, "Failed to fetch user for deletion");
            ErrorInternalServerError("Database error")
        })?;

    let Some(card_uid) = card_uid else {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "User not found" })));
    };

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %id, "Failed to delete user");
            ErrorInternalServerError("Database error")
        })?;

    card_filter::remove(&card_uid);
    card_cache::forget(&card_uid);
    info!(user_id = %id, card_uid = %card_uid, "User deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted" })))
}
