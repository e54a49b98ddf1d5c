//! Request-scoped memoizing address resolver.
//!
//! Each unique normalised address gets one `OnceCell`. The map lock is held
//! only long enough to fetch or insert the cell, and the upstream call runs
//! inside `OnceCell::get_or_init`, so concurrent callers for the same address
//! wait on the same in-flight lookup instead of issuing their own. Failures
//! are cached alongside successes; nothing is retried within a request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use rentmap_core::{normalize_text, Coordinate};

use crate::client::Geocoder;
use crate::error::{GeocodeError, ResolutionError};

type Resolution = Result<Coordinate, Arc<GeocodeError>>;

/// Memoizing front for a [`Geocoder`], scoped to a single search request.
pub struct AddressResolver {
    geocoder: Arc<dyn Geocoder>,
    entries: Mutex<HashMap<String, Arc<OnceCell<Resolution>>>>,
    upstream_calls: AtomicUsize,
}

impl AddressResolver {
    #[must_use]
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            entries: Mutex::new(HashMap::new()),
            upstream_calls: AtomicUsize::new(0),
        }
    }

    /// Resolves `address`, issuing at most one upstream call per normalised
    /// address for the lifetime of this resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when the (possibly cached) upstream lookup
    /// failed or the address is blank.
    pub async fn resolve(&self, address: &str) -> Result<Coordinate, ResolutionError> {
        let key = normalize_address(address);
        if key.is_empty() {
            return Err(ResolutionError {
                address: key,
                source: Arc::new(GeocodeError::NoMatch {
                    address: address.to_owned(),
                }),
            });
        }

        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        let resolution = cell
            .get_or_init(|| async {
                self.upstream_calls.fetch_add(1, Ordering::SeqCst);
                let result = self.geocoder.geocode(&key).await;
                if let Err(e) = &result {
                    tracing::warn!(address = %key, error = %e, "address resolution failed");
                }
                result.map_err(Arc::new)
            })
            .await;

        resolution.clone().map_err(|source| ResolutionError {
            address: key,
            source,
        })
    }

    /// Number of upstream geocoder calls issued so far.
    #[must_use]
    pub fn upstream_calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct addresses seen so far.
    pub async fn cached_addresses(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Cache key for an address: trimmed, with internal whitespace collapsed.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    normalize_text(address)
}
