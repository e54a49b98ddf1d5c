//! Browser automation seam.
//!
//! The crawl only ever talks to a [`PageDriver`]; the Chromium adapter lives
//! in [`crate::browser`] and tests provide an in-memory implementation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PageError;

/// One open page in a browser session.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Handle to a DOM element on the current page.
    type Element: Send + Sync;

    /// Navigates to `url` and waits for the initial load.
    async fn goto(&self, url: &str) -> Result<(), PageError>;

    /// All elements matching `selector`, in document order. `scope` limits
    /// the search to descendants of an element; `None` searches the page.
    async fn query_all(
        &self,
        scope: Option<&Self::Element>,
        selector: &str,
    ) -> Result<Vec<Self::Element>, PageError>;

    async fn query_one(
        &self,
        scope: Option<&Self::Element>,
        selector: &str,
    ) -> Result<Option<Self::Element>, PageError> {
        Ok(self.query_all(scope, selector).await?.into_iter().next())
    }

    /// The element's `textContent`, or an empty string when it has none.
    async fn read_text(&self, element: &Self::Element) -> Result<String, PageError>;

    /// A resolved DOM property such as `href` or `src`.
    async fn read_property(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, PageError>;

    async fn click(&self, element: &Self::Element) -> Result<(), PageError>;

    /// Returns once the document that was showing when [`click`] ran has
    /// been replaced and `ready_selector` matches a non-empty, stable set of
    /// elements in the new one. Without a preceding click only the
    /// selector condition applies.
    ///
    /// [`click`]: PageDriver::click
    ///
    /// # Errors
    ///
    /// Returns [`PageError::SettleTimeout`] when that does not happen within
    /// `timeout`.
    async fn await_settled(&self, ready_selector: &str, timeout: Duration)
        -> Result<(), PageError>;

    /// Releases the session. Calling it more than once is a no-op.
    async fn close(&self) -> Result<(), PageError>;
}

/// Opens fresh browser sessions, one per search request.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: PageDriver + 'static;

    async fn launch(&self) -> Result<Self::Session, PageError>;
}

/// One observation taken while waiting for a page to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleSample {
    /// The document current at the last click is gone.
    pub replaced: bool,
    /// Elements matching the ready selector in the current document.
    pub ready_count: usize,
}

/// Polls `sample` every `interval` until the page has been replaced and the
/// ready count is non-zero and equal on two consecutive replaced samples.
///
/// # Errors
///
/// Returns [`PageError::SettleTimeout`] when that does not happen within
/// `timeout`.
pub async fn poll_until_settled<F, Fut>(
    ready_selector: &str,
    timeout: Duration,
    interval: Duration,
    mut sample: F,
) -> Result<(), PageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SettleSample>,
{
    let settle = async {
        let mut previous: Option<usize> = None;
        loop {
            let current = sample().await;
            if current.replaced && current.ready_count > 0 && previous == Some(current.ready_count) {
                return;
            }
            previous = current.replaced.then_some(current.ready_count);
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(timeout, settle)
        .await
        .map_err(|_| PageError::SettleTimeout {
            selector: ready_selector.to_owned(),
            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
}
