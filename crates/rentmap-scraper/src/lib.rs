//! Listing crawl over a paginated search-results site.
//!
//! The crawl drives a browser session through the [`PageDriver`] trait, so
//! every stage above the Chromium adapter can be exercised against an
//! in-memory page in tests.

pub mod browser;
pub mod collision;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod filter;
pub mod page;
pub mod pipeline;
pub mod progress;

pub use browser::{ChromiumLauncher, ChromiumSession};
pub use collision::{separate_collisions, DEFAULT_MAX_JITTER_DEG};
pub use crawl::{crawl, CrawlPhase, CrawlSettings, CrawlState};
pub use error::{ExtractionError, PageError, ScraperError};
pub use extract::{extract_page, find_next_control, ExtractedPage, ListingSelectors};
pub use filter::DistanceFilter;
pub use page::{poll_until_settled, PageDriver, SessionLauncher, SettleSample};
pub use pipeline::{run_search, SearchRequest};
pub use progress::{CrawlProgress, NoopProgress, ProgressReporter};
