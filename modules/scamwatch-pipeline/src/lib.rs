pub mod aggregator;
pub mod budget;
pub mod classifier;
pub mod comments;
pub mod enrichment;
pub mod geocode;
pub mod ingest_url;
pub mod parser;
pub mod rate_limit;
pub mod reddit;
pub mod scheduler;
pub mod source;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use budget::TimeBudget;
pub use classifier::{Classification, Classifier, LlmClassifier};
pub use enrichment::{EnrichmentEngine, EnrichmentSummary, ReportOutcome};
pub use geocode::{GeocodeNormalizer, GeocodeOutcome, Geocoder, MemoryGeocodeCache};
pub use ingest_url::{PageScraper, UrlIngestor};
pub use rate_limit::RateLimiter;
pub use reddit::RedditClient;
pub use scheduler::{BatchCursor, BatchOutcome, BatchScheduler, BatchSettings, WorkMatrix};
pub use source::{PostSource, SearchResults, SourceClient};
