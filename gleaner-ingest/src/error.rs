use std::fmt;
use std::time::Duration;
use thiserror::Error;

use gleaner_core::StoreError;

/// Stages of one scrape, in order. Only the first three can fail the scrape;
/// the later ones degrade to fallbacks instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Validating,
    Fetching,
    Parsing,
    Extracting,
    Augmenting,
    Scoring,
    Done,
}

impl fmt::Display for ScrapeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeStage::Validating => "validating",
            ScrapeStage::Fetching => "fetching",
            ScrapeStage::Parsing => "parsing",
            ScrapeStage::Extracting => "extracting",
            ScrapeStage::Augmenting => "augmenting",
            ScrapeStage::Scoring => "scoring",
            ScrapeStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme {0:?}: only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error: status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("cancelled while {stage}")]
    Cancelled { stage: ScrapeStage },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ScrapeError {
    /// Stage the scrape was in when it failed.
    pub fn stage(&self) -> ScrapeStage {
        match self {
            ScrapeError::InvalidUrl { .. } | ScrapeError::UnsupportedScheme(_) => {
                ScrapeStage::Validating
            }
            ScrapeError::Fetch { .. }
            | ScrapeError::Status { .. }
            | ScrapeError::Timeout { .. }
            | ScrapeError::Client(_) => ScrapeStage::Fetching,
            ScrapeError::Parse { .. } => ScrapeStage::Parsing,
            ScrapeError::Cancelled { stage } => *stage,
        }
    }

    /// Input errors are rejected before any I/O happens.
    pub fn is_input_error(&self) -> bool {
        self.stage() == ScrapeStage::Validating
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("no URLs provided")]
    Empty,

    #[error("too many URLs: {count} (max {max})")]
    TooMany { count: usize, max: usize },
}

/// Failures of the service-level operations that wrap a scrape with the
/// cache, the per-URL deadline and the store.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("scrape of {url} exceeded {timeout:?}")]
    DeadlineExceeded { url: String, timeout: Duration },

    #[error("scrape of {0} was cancelled")]
    Cancelled(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_stages_are_limited_to_early_states() {
        let invalid = ScrapeError::InvalidUrl {
            url: "nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(invalid.stage(), ScrapeStage::Validating);
        assert!(invalid.is_input_error());

        let status = ScrapeError::Status {
            url: "https://example.com/".into(),
            status: 404,
        };
        assert_eq!(status.stage(), ScrapeStage::Fetching);
        assert!(!status.is_input_error());
        assert!(status.to_string().contains("404"));

        let parse = ScrapeError::Parse {
            url: "https://example.com/".into(),
            reason: "binary".into(),
        };
        assert_eq!(parse.stage(), ScrapeStage::Parsing);
    }

    #[test]
    fn test_batch_error_messages() {
        assert_eq!(BatchError::Empty.to_string(), "no URLs provided");
        assert_eq!(
            BatchError::TooMany { count: 51, max: 50 }.to_string(),
            "too many URLs: 51 (max 50)"
        );
    }
}
