//! Address-to-coordinate resolution.
//!
//! [`Geocoder`] abstracts the upstream resolution API; [`YolpGeocoder`] and
//! [`GsiGeocoder`] are the two supported providers. [`AddressResolver`] wraps
//! a geocoder with a request-scoped, single-flight cache.

pub mod client;
pub mod error;
pub mod gsi;
pub mod resolver;
pub mod yolp;

pub use client::{geocoder_from_config, Geocoder};
pub use error::{GeocodeError, ResolutionError};
pub use gsi::GsiGeocoder;
pub use resolver::{normalize_address, AddressResolver};
pub use yolp::YolpGeocoder;
