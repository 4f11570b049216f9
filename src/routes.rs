use crate::{
    api::{export, records, scan, users},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    governor::middleware::NoOpMiddleware, Governor, GovernorConfigBuilder, PeerIpKeyExtractor,
};
use actix_web::{middleware::from_fn, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let login_limiter = build_limiter(config.rate_login_per_min);
    let scan_limiter = build_limiter(config.rate_scan_per_min);
    let admin_limiter = build_limiter(config.rate_admin_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth").service(
            web::resource("/login")
                .wrap(login_limiter)
                .route(web::post().to(handlers::login)),
        ),
    );

    // Kiosk route: public by design, the card is the credential
    cfg.service(
        web::resource("/scan")
            .wrap(scan_limiter)
            .route(web::post().to(scan::scan)),
    );

    // Admin routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(admin_limiter) // rate limiting
            .service(
                web::scope("/users")
                    // /users
                    .service(
                        web::resource("")
                            .route(web::post().to(users::register_user))
                            .route(web::get().to(users::list_users)),
                    )
                    // /users/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(users::get_user))
                            .route(web::put().to(users::update_user))
                            .route(web::delete().to(users::delete_user)),
                    ),
            )
            .service(
                web::scope("/records")
                    // fixed paths must register before /{user_id}/{date}
                    .service(web::resource("/export").route(web::get().to(export::export_csv)))
                    .service(
                        web::resource("/close-day").route(web::post().to(records::close_day)),
                    )
                    // /records
                    .service(
                        web::resource("")
                            .route(web::get().to(records::list_records))
                            .route(web::delete().to(records::clear_records)),
                    )
                    // /records/{user_id}/{date}
                    .service(
                        web::resource("/{user_id}/{date}")
                            .route(web::delete().to(records::delete_record)),
                    ),
            ),
    );
}
