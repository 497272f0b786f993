use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http, web};
use rusqlite::Connection;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db;
use crate::app::auth::PassphraseGate;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::SqliteSessionService;

pub fn open_store(config: &AppConfig) -> Result<Connection, AppError> {
    if let Some(parent) = Path::new(&config.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(AppError::database_init)?;
    }

    let mut connection = db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    db::configure_busy_timeout(
        &connection,
        Duration::from_millis(config.db_busy_timeout_ms),
    )
    .map_err(AppError::database_init)?;
    db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    Ok(connection)
}

fn build_cors(allowed_origins: &[String]) -> Cors {
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_headers(vec![http::header::CONTENT_TYPE, http::header::ACCEPT])
        .supports_credentials()
        .max_age(3600)
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let connection = open_store(&config)?;
    let version = db::schema_version(&connection).map_err(AppError::database_init)?;
    tracing::info!(db_path = %config.db_path, schema_version = version, "session store ready");

    let gate = PassphraseGate::new(config.unlock_phrase.clone());
    if !gate.is_enabled() {
        tracing::warn!("UNLOCK_PHRASE is not set; all requests are authorized");
    }

    let api_state = ApiState::new(
        SqliteSessionService::new(Arc::new(Mutex::new(connection))),
        gate,
    );
    let allowed_origins = config.allowed_origins.clone();

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(build_cors(&allowed_origins))
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    tracing::info!("http server stopped");
    server_result.map_err(AppError::runtime)
}
