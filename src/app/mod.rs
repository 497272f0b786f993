pub mod auth;
mod config;
mod error;
mod logging;
pub mod recorder;
mod runtime;
pub mod services;

pub use config::AppConfig;
pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    let dotenv_result = dotenvy::dotenv();
    logging::init()?;

    if let Err(error) = dotenv_result
        && !error.not_found()
    {
        tracing::warn!(error = %error, "failed to load .env file");
    }

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        passphrase_enabled = config.unlock_phrase.is_some(),
        allowed_origins = ?config.allowed_origins,
        db_busy_timeout_ms = config.db_busy_timeout_ms,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
