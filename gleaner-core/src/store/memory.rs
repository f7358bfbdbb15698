//! In-memory record store for development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{image_matches, RecordStore, StoreError};
use crate::models::{ExtractedImage, Page, ScrapedRecord};

#[derive(Default)]
struct Inner {
    /// Keyed by normalized URL.
    records: HashMap<String, ScrapedRecord>,
    urls_by_id: HashMap<Uuid, String>,
}

impl Inner {
    fn newest_first(&self) -> Vec<&ScrapedRecord> {
        let mut records: Vec<&ScrapedRecord> = self.records.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.url.cmp(&b.url)));
        records
    }
}

/// Same contract as the Postgres store. Data is lost on drop.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored images that carry an id, across all records.
    pub async fn image_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .flat_map(|r| r.images.iter())
            .filter(|i| i.id.is_some())
            .count()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &ScrapedRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let mut stored = record.clone();
        stored.cached = false;

        if let Some(previous) = inner.records.remove(&record.url) {
            stored.created_at = previous.created_at;
            inner.urls_by_id.remove(&previous.id);
        }

        inner.urls_by_id.insert(stored.id, stored.url.clone());
        inner.records.insert(stored.url.clone(), stored);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ScrapedRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .urls_by_id
            .get(&id)
            .and_then(|url| inner.records.get(url))
            .cloned())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<ScrapedRecord>, StoreError> {
        Ok(self.inner.read().await.records.get(url).cloned())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let url = inner.urls_by_id.remove(&id).ok_or(StoreError::NotFound(id))?;
        inner.records.remove(&url);
        Ok(())
    }

    async fn list(&self, page: Page) -> Result<Vec<ScrapedRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .newest_first()
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().await.records.len() as i64)
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<ExtractedImage>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .flat_map(|r| r.images.iter())
            .find(|i| i.id == Some(id))
            .cloned())
    }

    async fn images_for_record(&self, record_id: Uuid) -> Result<Vec<ExtractedImage>, StoreError> {
        let inner = self.inner.read().await;
        let Some(record) = inner.urls_by_id.get(&record_id).and_then(|url| inner.records.get(url)) else {
            return Ok(Vec::new());
        };
        Ok(record.images.iter().filter(|i| i.id.is_some()).cloned().collect())
    }

    async fn search_images_by_tags(&self, tags: &[String]) -> Result<Vec<ExtractedImage>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .newest_first()
            .into_iter()
            .flat_map(|r| r.images.iter())
            .filter(|i| i.id.is_some() && image_matches(i, tags))
            .cloned()
            .collect())
    }
}
