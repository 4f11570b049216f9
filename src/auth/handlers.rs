use crate::{
    auth::{jwt::generate_admin_token, password::verify_password},
    config::Config,
    models::{LoginRequest, LoginResponse},
};
use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use tracing::{info, warn};

/// Admin login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = Object, example = json!({
            "error": "Invalid username or password"
        }))
    ),
    tag = "Auth"
)]
pub async fn login(config: web::Data<Config>, payload: web::Json<LoginRequest>) -> impl Responder {
    let username = payload.username.trim();

    let credentials_ok = username == config.admin_username
        && verify_password(&payload.password, &config.admin_password_hash).is_ok();

    if !credentials_ok {
        warn!(username, "Rejected admin login");
        return HttpResponse::Unauthorized().json(json!({
            "error": "Invalid username or password"
        }));
    }

    info!(username, "Admin logged in");

    let token = generate_admin_token(username, &config.jwt_secret, config.access_token_ttl);
    HttpResponse::Ok().json(LoginResponse { token })
}
