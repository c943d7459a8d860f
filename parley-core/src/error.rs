use thiserror::Error;

/// Startup failures: loading configuration and preparing the database.
/// Request-path errors live next to the code that raises them.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}
