use serde::{Deserialize, Serialize};

use super::record::ScrapedRecord;

/// Outcome of one URL in a batch. Never shared between items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScrapedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cached: bool,
}

impl BatchItemResult {
    pub fn scraped(url: impl Into<String>, record: ScrapedRecord) -> Self {
        Self {
            url: url.into(),
            success: true,
            data: Some(record),
            error: None,
            cached: false,
        }
    }

    pub fn cached(url: impl Into<String>, record: ScrapedRecord) -> Self {
        Self {
            url: url.into(),
            success: true,
            data: Some(record.mark_cached()),
            error: None,
            cached: true,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            cached: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub cached: usize,
    pub scraped: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchItemResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for item in results {
            if item.success {
                summary.success += 1;
                if item.cached {
                    summary.cached += 1;
                } else {
                    summary.scraped += 1;
                }
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Per-URL results in input order plus aggregate counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchItemResult>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn new(results: Vec<BatchItemResult>) -> Self {
        let summary = BatchSummary::from_results(&results);
        Self { results, summary }
    }
}
