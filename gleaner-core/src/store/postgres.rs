//! PostgreSQL record store.
//!
//! Records live in `scraped_records` as one JSONB document keyed by URL.
//! Images that carry an id are mirrored into `scraped_images` so they can
//! be fetched and searched on their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{image_matches, RecordStore, StoreError};
use crate::config::DatabaseConfig;
use crate::db;
use crate::models::{ExtractedImage, Page, ScrapedRecord};

#[derive(FromRow)]
struct RecordRow {
    data: Json<ScrapedRecord>,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    /// The row's creation time wins over the one serialized in the document,
    /// since re-saves keep the original.
    fn into_record(self) -> ScrapedRecord {
        let mut record = self.data.0;
        record.created_at = self.created_at;
        record
    }
}

#[derive(FromRow)]
struct ImageRow {
    id: Uuid,
    url: String,
    alt_text: String,
    summary: Option<String>,
    tags: Json<Vec<String>>,
    base64_data: Option<String>,
}

impl From<ImageRow> for ExtractedImage {
    fn from(row: ImageRow) -> Self {
        ExtractedImage {
            id: Some(row.id),
            url: row.url,
            alt_text: row.alt_text,
            summary: row.summary,
            tags: row.tags.0,
            base64_data: row.base64_data,
        }
    }
}

const IMAGE_COLUMNS: &str = "id, url, alt_text, summary, tags, base64_data";

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and make sure the tables exist.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = db::create_pool(config).await?;
        db::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn save(&self, record: &ScrapedRecord) -> Result<(), StoreError> {
        let mut document = record.clone();
        document.cached = false;

        let mut tx = self.pool.begin().await?;

        // Writers for one URL take turns; the lock is released on commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&record.url)
            .execute(&mut *tx)
            .await?;

        // Images of whichever row holds this URL right now, before its id changes.
        sqlx::query(
            "DELETE FROM scraped_images WHERE record_id IN (SELECT id FROM scraped_records WHERE url = $1)",
        )
        .bind(&record.url)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO scraped_records (id, url, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (url) DO UPDATE SET
                id = EXCLUDED.id,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id)
        .bind(&record.url)
        .bind(Json(&document))
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM scraped_images WHERE record_id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0usize;
        for (position, image) in record.images.iter().enumerate() {
            let Some(image_id) = image.id else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO scraped_images
                    (id, record_id, position, url, alt_text, summary, tags, base64_data)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(image_id)
            .bind(record.id)
            .bind(position as i32)
            .bind(&image.url)
            .bind(&image.alt_text)
            .bind(&image.summary)
            .bind(Json(&image.tags))
            .bind(&image.base64_data)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        tracing::debug!(id = %record.id, url = %record.url, images = inserted, "Record saved");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ScrapedRecord>, StoreError> {
        let row: Option<RecordRow> =
            sqlx::query_as("SELECT data, created_at FROM scraped_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(RecordRow::into_record))
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<ScrapedRecord>, StoreError> {
        let row: Option<RecordRow> =
            sqlx::query_as("SELECT data, created_at FROM scraped_records WHERE url = $1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(RecordRow::into_record))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let url: Option<(String,)> = sqlx::query_as("SELECT url FROM scraped_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((url,)) = url else {
            return Err(StoreError::NotFound(id));
        };

        // Same per-URL lock as `save`, so a delete never interleaves with a re-save.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&url)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM scraped_records WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list(&self, page: Page) -> Result<Vec<ScrapedRecord>, StoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT data, created_at FROM scraped_records ORDER BY created_at DESC, url LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RecordRow::into_record).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn url_exists(&self, url: &str) -> Result<bool, StoreError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM scraped_records WHERE url = $1)")
                .bind(url)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<ExtractedImage>, StoreError> {
        let row: Option<ImageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM scraped_images WHERE id = $1",
            IMAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ExtractedImage::from))
    }

    async fn images_for_record(&self, record_id: Uuid) -> Result<Vec<ExtractedImage>, StoreError> {
        let rows: Vec<ImageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM scraped_images WHERE record_id = $1 ORDER BY position",
            IMAGE_COLUMNS
        ))
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ExtractedImage::from).collect())
    }

    async fn search_images_by_tags(&self, tags: &[String]) -> Result<Vec<ExtractedImage>, StoreError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        // Bidirectional substring matching does not map onto an index, so filter here.
        let rows: Vec<ImageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM scraped_images ORDER BY created_at DESC, position",
            IMAGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(ExtractedImage::from)
            .filter(|image| image_matches(image, tags))
            .collect())
    }
}
