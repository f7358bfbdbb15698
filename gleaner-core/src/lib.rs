pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod telemetry;

pub use ai::{create_backend, AiBackend, AiError, OllamaClient};
pub use config::GleanerConfig;
pub use error::GleanerError;
pub use store::{tags_match, MemoryRecordStore, PgRecordStore, RecordStore, StoreError};
