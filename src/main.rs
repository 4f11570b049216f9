use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{get, App, HttpServer, Responder};
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod directory;
mod docs;
mod engine;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use config::Config;
use db::init_db;
use directory::UserDirectory;
use engine::AttendanceEngine;
use store::cache::RecordCache;
use store::sql::SqlRecordStore;

use crate::docs::ApiDoc;
use crate::utils::card_cache;
use crate::utils::card_filter;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "DTR scanner service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log. fmt().init() also installs the `log` bridge,
    // so warmup modules and the actix access log land here too.
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("DTR server starting...");

    let pool = init_db(&config.database_url).await?;

    let store = Arc::new(SqlRecordStore::new(pool.clone()));
    let engine = Data::new(AttendanceEngine::new(
        store,
        RecordCache::new(config.record_cache_capacity),
        Duration::from_millis(config.store_write_timeout_ms),
        config.allow_auto_action,
    ));
    let directory = Data::new(UserDirectory::new(pool.clone()));

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = card_filter::warmup_card_filter(&pool_for_filter_warmup, 100).await {
            eprintln!("Failed to warmup card filter: {:?}", e);
        }
    });

    actix_web::rt::spawn(async move {
        if let Err(e) = card_cache::warmup_card_cache(&pool_for_cache_warmup, 250).await {
            eprintln!("Failed to warmup card cache: {:?}", e);
        }
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(engine.clone())
            .app_data(directory.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
