use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::image::ExtractedImage;
use super::score::LinkScore;

/// Structured result of scraping one URL. At most one is stored per URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    /// Normalized URL, the unique key in the store.
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<ExtractedImage>,
    #[serde(default)]
    pub links: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "processing_time_seconds")]
    pub processing_time: f64,
    /// Set only on records read back from the store.
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub metadata: PageMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<LinkScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl ScrapedRecord {
    pub fn mark_cached(mut self) -> Self {
        self.cached = true;
        self
    }
}
