//! Errors of the shared configuration, schema and timestamp code

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML file that cannot be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timestamp column not in the `to_db_string` layout
    #[error("Invalid stored timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
