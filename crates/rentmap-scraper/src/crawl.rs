//! Click-through pagination over the results pages.
//!
//! ```text
//! Scraping(n) --next control--> Advancing(n) --click + settle--> Scraping(n+1)
//!      \
//!       `--no next control--> Done
//! ```
//!
//! Pages are strictly sequential: the next page is requested only after the
//! current page's listings have been extracted and filtered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rentmap_core::{AppConfig, Listing};

use crate::collision::DEFAULT_MAX_JITTER_DEG;
use crate::error::ScraperError;
use crate::extract::{extract_page, ListingSelectors};
use crate::filter::DistanceFilter;
use crate::page::PageDriver;
use crate::progress::{CrawlProgress, ProgressReporter};

/// Tunables for one search crawl.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub selectors: ListingSelectors,
    /// Pages beyond this count abort the crawl.
    pub max_pages: usize,
    /// Pause before clicking through to the next page.
    pub inter_page_delay: Duration,
    /// Bound on each page settle.
    pub navigation_timeout: Duration,
    /// Bound on the whole search, center resolution included.
    pub crawl_timeout: Duration,
    pub collision_jitter_deg: f64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            selectors: ListingSelectors::default(),
            max_pages: 50,
            inter_page_delay: Duration::from_millis(1000),
            navigation_timeout: Duration::from_secs(30),
            crawl_timeout: Duration::from_secs(600),
            collision_jitter_deg: DEFAULT_MAX_JITTER_DEG,
        }
    }
}

impl CrawlSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            selectors: ListingSelectors::default(),
            max_pages: config.crawl_max_pages,
            inter_page_delay: Duration::from_millis(config.inter_page_delay_ms),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            crawl_timeout: Duration::from_secs(config.crawl_timeout_secs),
            collision_jitter_deg: config.collision_jitter_deg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Scraping(usize),
    Advancing(usize),
    Done,
}

/// Accumulated result of a crawl.
#[derive(Debug, Default)]
pub struct CrawlState {
    /// 1-based index of the last page scraped.
    pub page_index: usize,
    /// Filtered listings in page order, then in-page order.
    pub listings: Vec<Listing>,
}

/// Crawls from the page `driver` currently shows until a page has no next
/// control.
///
/// # Errors
///
/// - [`ScraperError::Navigation`] when a page cannot be read, the next
///   control cannot be clicked, or the following page does not settle.
/// - [`ScraperError::PaginationLimit`] when more than `settings.max_pages`
///   pages would be visited.
/// - [`ScraperError::Cancelled`] when `cancel` fires.
pub async fn crawl<D>(
    driver: &D,
    filter: &DistanceFilter,
    settings: &CrawlSettings,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CrawlState, ScraperError>
where
    D: PageDriver + ?Sized,
{
    let mut state = CrawlState::default();
    let mut next_control: Option<D::Element> = None;
    let mut phase = CrawlPhase::Scraping(1);

    loop {
        if cancel.is_cancelled() {
            tracing::info!(page = state.page_index, "crawl cancelled");
            return Err(ScraperError::Cancelled);
        }

        phase = match phase {
            CrawlPhase::Scraping(page) => {
                state.page_index = page;
                let mut extracted = extract_page(driver, &settings.selectors).await?;
                let (drafts, skipped) = extracted.take_drafts(page);
                let extracted_count = drafts.len();

                let kept = filter.apply(drafts, cancel).await?;
                let kept_count = kept.len();
                state.listings.extend(kept);

                let has_next = extracted.next_control.is_some();
                tracing::info!(
                    page,
                    extracted = extracted_count,
                    skipped,
                    kept = kept_count,
                    total = state.listings.len(),
                    has_next,
                    "page scraped"
                );
                progress
                    .report(CrawlProgress::page_completed(
                        page,
                        extracted.pages_hint,
                        has_next,
                        state.listings.len(),
                    ))
                    .await;

                next_control = extracted.next_control;
                if has_next {
                    CrawlPhase::Advancing(page)
                } else {
                    CrawlPhase::Done
                }
            }
            CrawlPhase::Advancing(page) => {
                if page >= settings.max_pages {
                    return Err(ScraperError::PaginationLimit {
                        max_pages: settings.max_pages,
                    });
                }
                match next_control.take() {
                    None => CrawlPhase::Done,
                    Some(control) => {
                        if !settings.inter_page_delay.is_zero() {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return Err(ScraperError::Cancelled),
                                () = tokio::time::sleep(settings.inter_page_delay) => {}
                            }
                        }

                        tracing::debug!(from = page, "advancing to next page");
                        driver.click(&control).await?;
                        driver
                            .await_settled(&settings.selectors.container, settings.navigation_timeout)
                            .await?;
                        CrawlPhase::Scraping(page + 1)
                    }
                }
            }
            CrawlPhase::Done => {
                progress
                    .report(CrawlProgress::finished(
                        state.page_index,
                        state.listings.len(),
                    ))
                    .await;
                tracing::info!(
                    pages = state.page_index,
                    listings = state.listings.len(),
                    "crawl complete"
                );
                return Ok(state);
            }
        };
    }
}
