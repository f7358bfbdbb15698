pub mod batch;
pub mod image;
pub mod page;
pub mod record;
pub mod score;

pub use batch::{BatchItemResult, BatchOutcome, BatchSummary};
pub use image::ExtractedImage;
pub use page::Page;
pub use record::{PageMetadata, ScrapedRecord};
pub use score::LinkScore;
