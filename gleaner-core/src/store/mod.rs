//! Persistence and cache contract for scraped records.
//!
//! One record per URL. Saving a URL that is already stored replaces the
//! record's id, content and images while keeping its original creation
//! time. Images belong to exactly one record and go away with it.

mod memory;
mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ExtractedImage, Page, ScrapedRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(Uuid),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically upsert a record by URL and replace its image rows.
    async fn save(&self, record: &ScrapedRecord) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ScrapedRecord>, StoreError>;

    async fn get_by_url(&self, url: &str) -> Result<Option<ScrapedRecord>, StoreError>;

    /// Remove a record and its images. `NotFound` if no such id.
    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError>;

    /// Records ordered by creation time, newest first.
    async fn list(&self, page: Page) -> Result<Vec<ScrapedRecord>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn url_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.get_by_url(url).await?.is_some())
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<ExtractedImage>, StoreError>;

    async fn images_for_record(&self, record_id: Uuid) -> Result<Vec<ExtractedImage>, StoreError>;

    /// Images with at least one tag fuzzily matching one of `tags`.
    async fn search_images_by_tags(&self, tags: &[String]) -> Result<Vec<ExtractedImage>, StoreError>;
}

/// Case-insensitive substring match in either direction. Blank tags never match.
pub fn tags_match(query: &str, stored: &str) -> bool {
    let query = query.trim().to_lowercase();
    let stored = stored.trim().to_lowercase();
    if query.is_empty() || stored.is_empty() {
        return false;
    }
    stored.contains(&query) || query.contains(&stored)
}

/// True when any query tag relates to any of the image's tags.
pub fn image_matches(image: &ExtractedImage, query: &[String]) -> bool {
    query
        .iter()
        .any(|q| image.tags.iter().any(|t| tags_match(q, t)))
}
