use thiserror::Error;

use rentmap_geocoder::ResolutionError;

/// Failures reported by a browser session.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("page did not settle on \"{selector}\" within {waited_ms}ms")]
    SettleTimeout { selector: String, waited_ms: u64 },

    #[error("browser session is closed")]
    Closed,
}

/// A single listing card that could not be read.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("listing is missing required field \"{field}\"")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Page(#[from] PageError),
}

#[derive(Debug, Error)]
pub enum ScraperError {
    /// The search page failed to load or pagination could not advance.
    #[error("navigation failed: {0}")]
    Navigation(#[from] PageError),

    #[error("center address could not be resolved: {0}")]
    CenterResolution(#[source] ResolutionError),

    #[error("pagination limit reached: exceeded {max_pages} pages")]
    PaginationLimit { max_pages: usize },

    #[error("crawl was cancelled")]
    Cancelled,

    #[error("crawl exceeded its {limit_secs}s time limit")]
    TimedOut { limit_secs: u64 },
}
