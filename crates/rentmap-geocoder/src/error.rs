use std::sync::Arc;

use thiserror::Error;

/// Errors returned by an upstream geocoding provider.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The provider answered with an application-level error message.
    #[error("geocoder API error: {0}")]
    Api(String),

    #[error("no match for address \"{address}\"")]
    NoMatch { address: String },

    #[error("malformed coordinates in geocoder response: \"{raw}\"")]
    MalformedCoordinates { raw: String },

    #[error("invalid geocoder base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },

    #[error("geocoder is not configured: {0}")]
    NotConfigured(String),
}

/// A failed resolution as recorded in the address cache.
///
/// Cloneable so every listing sharing the address sees the same failure.
#[derive(Debug, Clone, Error)]
#[error("could not resolve address \"{address}\": {source}")]
pub struct ResolutionError {
    pub address: String,
    #[source]
    pub source: Arc<GeocodeError>,
}

impl ResolutionError {
    /// Returns `true` when the provider simply had no match for the address.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(*self.source, GeocodeError::NoMatch { .. })
    }
}
