//! Provider abstraction and the HTTP plumbing shared by providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use rentmap_core::{AppConfig, Coordinate, GeocoderProvider};

use crate::error::GeocodeError;
use crate::gsi::GsiGeocoder;
use crate::yolp::YolpGeocoder;

/// An upstream service that maps free-text addresses to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves `address` to a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::NoMatch`] when the provider knows no such
    /// address, or another [`GeocodeError`] on transport or format failures.
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError>;
}

/// Builds the geocoder selected by `config.geocoder`.
///
/// # Errors
///
/// Returns [`GeocodeError::NotConfigured`] when YOLP is selected without an
/// app id, [`GeocodeError::InvalidBaseUrl`] for a bad base URL override, or
/// [`GeocodeError::Http`] if the HTTP client cannot be constructed.
pub fn geocoder_from_config(config: &AppConfig) -> Result<Arc<dyn Geocoder>, GeocodeError> {
    let base_url = config.geocoder_base_url.as_deref();
    match config.geocoder {
        GeocoderProvider::Yolp => {
            let app_id = config.yolp_app_id.as_deref().ok_or_else(|| {
                GeocodeError::NotConfigured("RENTMAP_YOLP_APP_ID is not set".to_owned())
            })?;
            let geocoder = YolpGeocoder::with_base_url(
                app_id,
                config.geocoder_timeout_secs,
                &config.user_agent,
                base_url.unwrap_or(crate::yolp::DEFAULT_BASE_URL),
            )?;
            Ok(Arc::new(geocoder))
        }
        GeocoderProvider::Gsi => {
            let geocoder = GsiGeocoder::with_base_url(
                config.geocoder_timeout_secs,
                &config.user_agent,
                base_url.unwrap_or(crate::gsi::DEFAULT_BASE_URL),
            )?;
            Ok(Arc::new(geocoder))
        }
    }
}

pub(crate) fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client, GeocodeError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?)
}

/// Parses `base_url` and joins `endpoint` onto it.
///
/// The base is normalised to end with exactly one slash so that the join
/// appends to the path instead of replacing its last segment.
pub(crate) fn endpoint_url(base_url: &str, endpoint: &str) -> Result<Url, GeocodeError> {
    let invalid = |reason: String| GeocodeError::InvalidBaseUrl {
        base_url: base_url.to_owned(),
        reason,
    };
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised)
        .and_then(|base| base.join(endpoint))
        .map_err(|e| invalid(e.to_string()))
}

/// Parses a `"lng,lat"` pair as used by YOLP and GeoJSON-ish payloads.
pub(crate) fn parse_lng_lat(raw: &str) -> Result<Coordinate, GeocodeError> {
    let malformed = || GeocodeError::MalformedCoordinates {
        raw: raw.to_owned(),
    };
    let mut parts = raw.split(',').map(str::trim);
    let lng = parts
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(malformed)?;
    let lat = parts
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(malformed)?;
    checked_coordinate(lat, lng).ok_or_else(malformed)
}

/// Returns a coordinate if `lat`/`lng` are finite and within WGS84 bounds.
pub(crate) fn checked_coordinate(lat: f64, lng: f64) -> Option<Coordinate> {
    let in_range = lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng);
    in_range.then(|| Coordinate::new(lat, lng))
}
