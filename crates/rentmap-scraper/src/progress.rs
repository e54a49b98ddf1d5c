//! Per-page crawl progress.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Snapshot emitted after each completed page and once more on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProgress {
    pub page: usize,
    /// Best current guess at the total page count. Grows as more of the
    /// pagination bar becomes visible.
    pub pages_estimate: usize,
    pub percent: u8,
    pub listings_so_far: usize,
    pub done: bool,
}

impl CrawlProgress {
    /// Progress after finishing `page`.
    ///
    /// The estimate is the larger of the highest page number seen in the
    /// pagination bar and the pages known to exist so far. While a next page
    /// exists the percentage stays below 100.
    #[must_use]
    pub fn page_completed(
        page: usize,
        pages_hint: Option<usize>,
        has_next: bool,
        listings_so_far: usize,
    ) -> Self {
        let known = if has_next { page + 1 } else { page };
        let pages_estimate = pages_hint.unwrap_or(0).max(known).max(1);
        let mut percent = page.saturating_mul(100) / pages_estimate;
        if has_next {
            percent = percent.min(99);
        }
        Self {
            page,
            pages_estimate,
            percent: u8::try_from(percent.min(100)).unwrap_or(100),
            listings_so_far,
            done: false,
        }
    }

    #[must_use]
    pub fn finished(pages: usize, listings: usize) -> Self {
        Self {
            page: pages,
            pages_estimate: pages,
            percent: 100,
            listings_so_far: listings,
            done: true,
        }
    }
}

/// Receiver of crawl progress events.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, progress: CrawlProgress);
}

/// Discards every event.
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _progress: CrawlProgress) {}
}

#[async_trait]
impl ProgressReporter for mpsc::Sender<CrawlProgress> {
    async fn report(&self, progress: CrawlProgress) {
        if self.send(progress).await.is_err() {
            tracing::debug!(page = progress.page, "progress receiver dropped");
        }
    }
}
