pub mod crawler;
pub mod element;
pub mod error;
pub mod extractor;
pub mod page;
pub mod record;
pub mod script;

pub use crawler::{Crawler, ProgressCallback};
pub use error::ScanError;
pub use record::{CaptchaRecord, CaptchaResult, CrawlOutcome, DedupPolicy, Location};
