//! One end-to-end search: center lookup, browser session, crawl, collision
//! separation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use rentmap_core::Listing;
use rentmap_geocoder::{AddressResolver, Geocoder};

use crate::collision::separate_collisions;
use crate::crawl::{crawl, CrawlSettings, CrawlState};
use crate::error::ScraperError;
use crate::filter::DistanceFilter;
use crate::page::{PageDriver, SessionLauncher};
use crate::progress::ProgressReporter;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// First results page of the search.
    pub url: String,
    pub center_address: String,
    /// Listings must lie strictly closer than this to the center.
    pub threshold_m: f64,
}

/// Runs a complete search and returns the matching listings in page order.
///
/// The browser session is closed before this returns, whether the crawl
/// succeeded, failed, timed out, or was cancelled. No partial results are
/// returned on failure.
///
/// # Errors
///
/// - [`ScraperError::CenterResolution`] if the center address does not resolve.
/// - [`ScraperError::Navigation`] if the browser cannot be launched, the
///   first page does not load, or pagination fails.
/// - [`ScraperError::TimedOut`] if the search exceeds `settings.crawl_timeout`.
/// - [`ScraperError::Cancelled`] if `cancel` fires.
/// - [`ScraperError::PaginationLimit`] if the site has too many pages.
pub async fn run_search<L>(
    launcher: &L,
    geocoder: Arc<dyn Geocoder>,
    request: &SearchRequest,
    settings: &CrawlSettings,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<Listing>, ScraperError>
where
    L: SessionLauncher + ?Sized,
{
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + settings.crawl_timeout;
    let limit_secs = settings.crawl_timeout.as_secs();

    tracing::info!(
        url = %request.url,
        center = %request.center_address,
        threshold_m = request.threshold_m,
        "starting search"
    );

    let resolver = AddressResolver::new(geocoder);
    let center = within(deadline, limit_secs, cancel, async {
        resolver
            .resolve(&request.center_address)
            .await
            .map_err(ScraperError::CenterResolution)
    })
    .await?;
    let filter = DistanceFilter::new(center, request.threshold_m, resolver);
    tracing::debug!(lat = center.lat, lng = center.lng, "center resolved");

    let session = within(deadline, limit_secs, cancel, async {
        launcher.launch().await.map_err(ScraperError::Navigation)
    })
    .await?;

    let outcome = within(
        deadline,
        limit_secs,
        cancel,
        drive(&session, request, &filter, settings, progress, cancel),
    )
    .await;

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing browser session failed");
    }

    let state = match outcome {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, url = %request.url, "search failed");
            return Err(e);
        }
    };

    let mut listings = state.listings;
    let moved = separate_collisions(&mut listings, settings.collision_jitter_deg, &mut rand::rng());

    let center = filter.center();
    tracing::info!(
        center_lat = center.lat,
        center_lng = center.lng,
        threshold_m = request.threshold_m,
        pages = state.page_index,
        listings = listings.len(),
        separated = moved,
        geocoder_calls = filter.resolver().upstream_calls(),
        elapsed_ms = started.elapsed().as_millis(),
        "search complete"
    );
    Ok(listings)
}

async fn drive<D>(
    session: &D,
    request: &SearchRequest,
    filter: &DistanceFilter,
    settings: &CrawlSettings,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CrawlState, ScraperError>
where
    D: PageDriver + ?Sized,
{
    session.goto(&request.url).await?;
    session
        .await_settled(&settings.selectors.container, settings.navigation_timeout)
        .await?;
    crawl(session, filter, settings, progress, cancel).await
}

/// Runs `step` unless the overall deadline passes or the crawl is cancelled
/// first.
async fn within<T, F>(
    deadline: tokio::time::Instant,
    limit_secs: u64,
    cancel: &CancellationToken,
    step: F,
) -> Result<T, ScraperError>
where
    F: Future<Output = Result<T, ScraperError>>,
{
    let guarded = async {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            result = step => result,
        }
    };
    tokio::time::timeout_at(deadline, guarded)
        .await
        .unwrap_or(Err(ScraperError::TimedOut { limit_secs }))
}
