use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An `<img>` found on a page, plus whatever the image pipeline learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// Assigned by the image pipeline; `None` when analysis is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Standard base64 of the downloaded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_data: Option<String>,
}

impl ExtractedImage {
    pub fn new(url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            alt_text: alt_text.into(),
            summary: None,
            tags: Vec::new(),
            base64_data: None,
        }
    }
}
