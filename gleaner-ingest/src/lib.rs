pub mod augment;
pub mod batch;
pub mod error;
pub mod extract;
pub mod images;
pub mod links;
pub mod scoring;
pub mod scrape;

pub use augment::{AugmentError, Augmented, Augmenter, ImageAnalysis};
pub use batch::{Provenance, ScrapeService};
pub use error::{BatchError, ScrapeError, ScrapeStage, ServiceError};
pub use extract::{extract_fields, parse_document, PageFields};
pub use images::{ImageError, ImagePipeline};
pub use links::LinkSanitizer;
pub use scoring::{AiScorer, Assessment, FallbackScorer, QualityScorer, RuleBasedScorer};
pub use scrape::Scraper;
