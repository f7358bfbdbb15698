use thiserror::Error;

use crate::ai::AiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum GleanerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("Tracing setup error: {0}")]
    Tracing(String),

    #[error("Other error: {0}")]
    Other(String),
}
