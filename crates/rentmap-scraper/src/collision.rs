//! Spreads out listings that share an exact coordinate so every marker on
//! the map stays clickable.

use std::collections::HashSet;

use rand::Rng;

use rentmap_core::{Coordinate, Listing, MIN_COLLISION_JITTER_DEG};

/// Default upper bound, in degrees, of the offset applied on each axis.
pub const DEFAULT_MAX_JITTER_DEG: f64 = 0.002;

/// Random draws per listing before falling back to stepping latitude.
const MAX_REDRAWS: usize = 32;

/// Moves every listing that repeats an earlier listing's exact coordinate by
/// an independent offset drawn from `[0, max_jitter_deg)` on each axis.
///
/// The first listing of each group keeps its coordinate. An offset landing
/// on a coordinate already in use is redrawn, so listings that started out
/// distinct never become equal. After a bounded number of occupied draws the
/// latitude is stepped one representable value at a time until it lands on
/// a free coordinate. The slice order is untouched. Returns the number of
/// listings moved.
///
/// A non-finite or non-positive bound leaves every coordinate as-is; a
/// positive bound below [`MIN_COLLISION_JITTER_DEG`] is raised to it.
pub fn separate_collisions<R: Rng>(
    listings: &mut [Listing],
    max_jitter_deg: f64,
    rng: &mut R,
) -> usize {
    if !(max_jitter_deg.is_finite() && max_jitter_deg > 0.0) {
        tracing::warn!(max_jitter_deg, "invalid jitter bound; leaving coordinates as-is");
        return 0;
    }
    let max_jitter_deg = if max_jitter_deg < MIN_COLLISION_JITTER_DEG {
        tracing::warn!(
            max_jitter_deg,
            floor = MIN_COLLISION_JITTER_DEG,
            "jitter bound too small; using floor"
        );
        MIN_COLLISION_JITTER_DEG
    } else {
        max_jitter_deg
    };

    let mut occupied: HashSet<(u64, u64)> =
        listings.iter().map(|l| l.coordinate.bit_key()).collect();
    let mut seen = HashSet::with_capacity(listings.len());
    let mut moved = 0;

    for listing in listings.iter_mut() {
        let origin = listing.coordinate;
        if seen.insert(origin.bit_key()) {
            continue;
        }
        listing.coordinate = draw_free(origin, max_jitter_deg, &mut occupied, rng);
        moved += 1;
    }

    if moved > 0 {
        tracing::debug!(moved, "separated colliding coordinates");
    }
    moved
}

/// Picks an unoccupied coordinate near `origin` and marks it occupied.
fn draw_free<R: Rng>(
    origin: Coordinate,
    max_jitter_deg: f64,
    occupied: &mut HashSet<(u64, u64)>,
    rng: &mut R,
) -> Coordinate {
    for _ in 0..MAX_REDRAWS {
        let candidate = origin.offset(
            rng.random_range(0.0..max_jitter_deg),
            rng.random_range(0.0..max_jitter_deg),
        );
        if occupied.insert(candidate.bit_key()) {
            return candidate;
        }
    }

    tracing::debug!(lat = origin.lat, lng = origin.lng, "random offsets exhausted; stepping latitude");
    let mut lat = origin.lat;
    loop {
        lat = lat.next_up();
        let candidate = Coordinate::new(lat, origin.lng);
        if occupied.insert(candidate.bit_key()) {
            return candidate;
        }
    }
}
