//! Cache-aware scraping service and the concurrent batch orchestrator.
//!
//! Every URL, alone or in a batch, goes through the same flow: validate,
//! look up the store unless forced, otherwise scrape under the per-URL
//! deadline and persist. A failed write is logged and the fresh record is
//! still returned.

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gleaner_core::config::{BatchConfig, GleanerConfig};
use gleaner_core::models::{BatchItemResult, BatchOutcome, ExtractedImage, Page, ScrapedRecord};
use gleaner_core::{create_backend, db, GleanerError, PgRecordStore, RecordStore};

use crate::error::{BatchError, ScrapeError, ServiceError};
use crate::scrape::Scraper;

/// Where a returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Cache,
    Scraped,
}

#[derive(Clone)]
pub struct ScrapeService {
    scraper: Arc<Scraper>,
    store: Arc<dyn RecordStore>,
    config: BatchConfig,
}

impl ScrapeService {
    pub fn new(scraper: Arc<Scraper>, store: Arc<dyn RecordStore>, config: BatchConfig) -> Self {
        Self {
            scraper,
            store,
            config,
        }
    }

    /// Wire up the configured AI backend and the Postgres store, checking
    /// that the database answers before returning.
    pub async fn connect(config: &GleanerConfig) -> Result<Self, GleanerError> {
        let backend = create_backend(&config.ai)?;
        let scraper = Scraper::new(config, backend)
            .map_err(|e| GleanerError::Other(format!("failed to build scraper: {}", e)))?;
        let store = PgRecordStore::connect(&config.database).await?;
        let version = db::health_check(store.pool()).await?;
        tracing::info!(postgres = %version, "Scrape service connected");
        Ok(Self::new(Arc::new(scraper), Arc::new(store), config.batch.clone()))
    }

    /// A store error here is treated as a miss; the scrape still runs.
    async fn lookup(&self, key: &str) -> Option<ScrapedRecord> {
        match self.store.get_by_url(key).await {
            Ok(hit) => hit.map(ScrapedRecord::mark_cached),
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "Cache lookup failed, scraping instead");
                None
            }
        }
    }

    async fn scrape_and_save(&self, raw_url: &str, cancel: &CancellationToken) -> Result<ScrapedRecord, ServiceError> {
        let timeout = self.config.item_timeout();
        let record = match tokio::time::timeout(timeout, self.scraper.scrape(raw_url, cancel)).await {
            Ok(Err(ScrapeError::Cancelled { stage })) => {
                tracing::info!(url = %raw_url, stage = %stage, "Scrape cancelled");
                return Err(ServiceError::Cancelled(raw_url.to_string()));
            }
            Ok(result) => result?,
            Err(_) => {
                // Stop anything still running under this URL's token.
                cancel.cancel();
                return Err(ServiceError::DeadlineExceeded {
                    url: raw_url.to_string(),
                    timeout,
                });
            }
        };

        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled(raw_url.to_string()));
        }

        if let Err(e) = self.store.save(&record).await {
            tracing::error!(url = %record.url, id = %record.id, error = %e, "Failed to save scraped record");
        }
        Ok(record)
    }

    async fn resolve(
        &self,
        raw_url: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(ScrapedRecord, Provenance), ServiceError> {
        let key = Scraper::normalize_url(raw_url)?;
        if !force {
            if let Some(hit) = self.lookup(&key).await {
                tracing::debug!(url = %key, id = %hit.id, "Cache hit");
                return Ok((hit, Provenance::Cache));
            }
        }
        let record = self.scrape_and_save(raw_url, cancel).await?;
        Ok((record, Provenance::Scraped))
    }

    /// Scrape one URL, or serve it from the store unless `force` is set.
    pub async fn scrape_url(
        &self,
        raw_url: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<ScrapedRecord, ServiceError> {
        let item_cancel = cancel.child_token();
        let (record, _) = self.resolve(raw_url, force, &item_cancel).await?;
        Ok(record)
    }

    async fn batch_item(self, raw_url: String, force: bool, cancel: CancellationToken) -> BatchItemResult {
        match self.resolve(&raw_url, force, &cancel).await {
            Ok((record, Provenance::Cache)) => BatchItemResult::cached(raw_url, record),
            Ok((record, Provenance::Scraped)) => BatchItemResult::scraped(raw_url, record),
            Err(e) => {
                tracing::warn!(url = %raw_url, error = %e, "Batch item failed");
                BatchItemResult::failed(raw_url, e.to_string())
            }
        }
    }

    /// Scrape up to `batch.max_urls` URLs concurrently. Results come back in
    /// input order; one item failing never affects another.
    pub async fn scrape_batch(
        &self,
        urls: Vec<String>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        if urls.is_empty() {
            return Err(BatchError::Empty);
        }
        if urls.len() > self.config.max_urls {
            return Err(BatchError::TooMany {
                count: urls.len(),
                max: self.config.max_urls,
            });
        }

        tracing::info!(count = urls.len(), force, "Starting batch");

        let handles: Vec<_> = urls
            .iter()
            .map(|raw_url| {
                let service = self.clone();
                let item_cancel = cancel.child_token();
                tokio::spawn(service.batch_item(raw_url.clone(), force, item_cancel))
            })
            .collect();

        let results: Vec<BatchItemResult> = join_all(handles)
            .await
            .into_iter()
            .zip(urls)
            .map(|(joined, raw_url)| match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(url = %raw_url, error = %e, "Batch task panicked");
                    BatchItemResult::failed(raw_url, format!("scrape task failed: {}", e))
                }
            })
            .collect();

        let outcome = BatchOutcome::new(results);
        tracing::info!(
            total = outcome.summary.total,
            success = outcome.summary.success,
            failed = outcome.summary.failed,
            cached = outcome.summary.cached,
            scraped = outcome.summary.scraped,
            "Batch complete"
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub async fn get_record(&self, id: Uuid) -> Result<Option<ScrapedRecord>, ServiceError> {
        Ok(self.store.get_by_id(id).await?.map(ScrapedRecord::mark_cached))
    }

    pub async fn list_records(&self, page: Page) -> Result<Vec<ScrapedRecord>, ServiceError> {
        let records = self.store.list(page).await?;
        Ok(records.into_iter().map(ScrapedRecord::mark_cached).collect())
    }

    pub async fn count_records(&self) -> Result<i64, ServiceError> {
        Ok(self.store.count().await?)
    }

    pub async fn delete_record(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.delete_by_id(id).await?;
        tracing::info!(id = %id, "Record deleted");
        Ok(())
    }

    pub async fn get_image(&self, id: Uuid) -> Result<Option<ExtractedImage>, ServiceError> {
        Ok(self.store.get_image(id).await?)
    }

    /// Fuzzy tag search. Blank tags are ignored; at least one real tag is required.
    pub async fn search_images(&self, tags: &[String]) -> Result<Vec<ExtractedImage>, ServiceError> {
        let tags: Vec<String> = tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            return Err(ServiceError::InvalidInput("at least one tag is required".to_string()));
        }
        Ok(self.store.search_images_by_tags(&tags).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gleaner_core::{MemoryRecordStore, StoreError};

    fn offline_scraper() -> Arc<Scraper> {
        let mut config = GleanerConfig::default();
        config.images.enabled = false;
        Arc::new(Scraper::new(&config, None).unwrap())
    }

    fn service(store: Arc<dyn RecordStore>) -> ScrapeService {
        ScrapeService::new(offline_scraper(), store, BatchConfig::default())
    }

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn save(&self, _record: &ScrapedRecord) -> Result<(), StoreError> {
            Err(StoreError::NotFound(Uuid::nil()))
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<ScrapedRecord>, StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn get_by_url(&self, _url: &str) -> Result<Option<ScrapedRecord>, StoreError> {
            Err(StoreError::NotFound(Uuid::nil()))
        }
        async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn list(&self, _page: Page) -> Result<Vec<ScrapedRecord>, StoreError> {
            Err(StoreError::NotFound(Uuid::nil()))
        }
        async fn count(&self) -> Result<i64, StoreError> {
            Err(StoreError::NotFound(Uuid::nil()))
        }
        async fn get_image(&self, id: Uuid) -> Result<Option<ExtractedImage>, StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn images_for_record(&self, id: Uuid) -> Result<Vec<ExtractedImage>, StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn search_images_by_tags(&self, _tags: &[String]) -> Result<Vec<ExtractedImage>, StoreError> {
            Err(StoreError::NotFound(Uuid::nil()))
        }
    }

    #[tokio::test]
    async fn test_connect_reports_bad_database_url() {
        let mut config = GleanerConfig::default();
        config.ai.enabled = false;
        config.database.url = "not a database url".to_string();
        let result = ScrapeService::connect(&config).await;
        assert!(matches!(result, Err(GleanerError::Store(_))));
    }

    #[tokio::test]
    async fn test_batch_input_limits() {
        let service = service(Arc::new(MemoryRecordStore::new()));
        let cancel = CancellationToken::new();

        assert_eq!(
            service.scrape_batch(vec![], false, &cancel).await.unwrap_err(),
            BatchError::Empty
        );

        let too_many: Vec<String> = (0..51).map(|i| format!("https://example.com/{}", i)).collect();
        assert_eq!(
            service.scrape_batch(too_many, false, &cancel).await.unwrap_err(),
            BatchError::TooMany { count: 51, max: 50 }
        );
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_any_io() {
        let service = service(Arc::new(BrokenStore));
        let result = service
            .scrape_url("mailto:someone@example.com", false, &CancellationToken::new())
            .await;
        match result {
            Err(ServiceError::Scrape(e)) => assert!(e.is_input_error()),
            other => panic!("Expected input error, got {:?}", other.map(|r| r.id)),
        }
    }

    #[tokio::test]
    async fn test_search_requires_a_tag() {
        let service = service(Arc::new(MemoryRecordStore::new()));
        let result = service.search_images(&["  ".to_string()]).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert!(service.search_images(&["cat".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_side_marks_records_cached() {
        let store = Arc::new(MemoryRecordStore::new());
        let now = chrono::Utc::now();
        let record = ScrapedRecord {
            id: Uuid::new_v4(),
            url: "https://example.com/".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            images: vec![],
            links: vec![],
            fetched_at: now,
            created_at: now,
            processing_time: 0.0,
            cached: false,
            metadata: Default::default(),
            score: None,
        };
        store.save(&record).await.unwrap();

        let service = service(store);
        assert!(service.get_record(record.id).await.unwrap().unwrap().cached);
        assert!(service.list_records(Page::default()).await.unwrap()[0].cached);
        assert_eq!(service.count_records().await.unwrap(), 1);

        service.delete_record(record.id).await.unwrap();
        assert!(matches!(
            service.delete_record(record.id).await,
            Err(ServiceError::Store(StoreError::NotFound(_)))
        ));
    }
}
