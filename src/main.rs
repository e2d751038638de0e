#[macro_use]
extern crate log;

use std::{sync::Arc, time::Duration};

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, middleware::Logger, web::Data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use polls_site::config::AppConfig;
use polls_site::db::PollsDb;
use polls_site::operations::PollOperations;
use polls_site::paths;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let config = AppConfig::from_env()
        .unwrap_or_else(|e| panic!("Failed to load configuration: {}", e));

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(2))
        .test_before_acquire(true)
        .connect(&config.db_url)
        .await
        .expect("Failed to create database pool");

    let db = PollsDb::new(pool);
    db.migrate().await.expect("Failed to apply migrations");

    let session_key = match &config.session_key {
        Some(bytes) => Key::from(bytes),
        None => {
            warn!("{} not set, sessions will not survive a restart", polls_site::config::SESSION_KEY);
            Key::generate()
        }
    };
    let secure_cookies = config.secure_cookies;

    let ops = Data::new(PollOperations::new(Arc::new(db)));
    let app = move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(secure_cookies)
                    .build()
            )
            .wrap(Logger::default())
            .app_data(ops.clone())
            .configure(paths::config::<PollOperations>)
    };

    info!("listening on {}", config.bind_addr);
    HttpServer::new(app).bind(config.bind_addr.as_str())?
        .run()
        .await
}
