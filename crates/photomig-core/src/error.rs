use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata database error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("Source root unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid source location: {0}")]
    InvalidSource(String),

    #[error("Destination connection failed: {0}")]
    Connection(String),

    #[error("Destination request failed: {0}")]
    Destination(String),
}
