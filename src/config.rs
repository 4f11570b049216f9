use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    pub admin_username: String,
    /// Argon2 PHC string; mint one with the hash-admin-password helper.
    pub admin_password_hash: String,
    pub access_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_scan_per_min: u32,
    pub rate_admin_per_min: u32,

    // Engine tuning
    pub record_cache_capacity: u64,
    pub store_write_timeout_ms: u64,
    /// Legacy kiosks only: let the server pick the action when a scan
    /// arrives without one.
    pub allow_auto_action: bool,

    pub api_prefix: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            admin_username: env::var("ADMIN_USERNAME").expect("ADMIN_USERNAME must be set"),
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH")
                .expect("ADMIN_PASSWORD_HASH must be set"),
            access_token_ttl: env::var("ACCESS_TOKEN_TTL")
                .unwrap_or_else(|_| "28800".to_string()) // default 8h shift
                .parse()
                .unwrap(),

            rate_login_per_min: env::var("RATE_LOGIN_PER_MIN")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap(),
            rate_scan_per_min: env::var("RATE_SCAN_PER_MIN")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap(),
            rate_admin_per_min: env::var("RATE_ADMIN_PER_MIN")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap(),

            record_cache_capacity: env::var("RECORD_CACHE_CAPACITY")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap(),
            store_write_timeout_ms: env::var("STORE_WRITE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap(),
            allow_auto_action: env::var("ALLOW_AUTO_ACTION")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
        }
    }
}
