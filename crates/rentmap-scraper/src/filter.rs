//! Keeps listings within a radius of the search center.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use rentmap_core::{distance_m, Coordinate, Listing, ListingDraft};
use rentmap_geocoder::AddressResolver;

use crate::error::ScraperError;

pub struct DistanceFilter {
    center: Coordinate,
    threshold_m: f64,
    resolver: AddressResolver,
}

impl DistanceFilter {
    #[must_use]
    pub fn new(center: Coordinate, threshold_m: f64, resolver: AddressResolver) -> Self {
        Self {
            center,
            threshold_m,
            resolver,
        }
    }

    #[must_use]
    pub fn center(&self) -> Coordinate {
        self.center
    }

    #[must_use]
    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Whether a point lies strictly inside the radius.
    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        distance_m(self.center, coordinate) < self.threshold_m
    }

    /// Resolves every draft's address and keeps those strictly closer than
    /// the threshold, in input order. Drafts whose address cannot be resolved
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Cancelled`] if `cancel` fires while addresses
    /// are being resolved.
    pub async fn apply(
        &self,
        drafts: Vec<ListingDraft>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Listing>, ScraperError> {
        let lookups = join_all(drafts.iter().map(|d| self.resolver.resolve(&d.address)));
        let resolutions = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ScraperError::Cancelled),
            resolutions = lookups => resolutions,
        };

        let mut kept = Vec::with_capacity(drafts.len());
        for (draft, resolution) in drafts.into_iter().zip(resolutions) {
            match resolution {
                Ok(coordinate) if self.contains(coordinate) => kept.push(draft.locate(coordinate)),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(address = %draft.address, error = %e, "dropping unresolvable listing");
                }
            }
        }
        Ok(kept)
    }
}
