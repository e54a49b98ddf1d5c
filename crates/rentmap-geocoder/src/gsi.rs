//! GSI (Geospatial Information Authority of Japan) address search.
//!
//! `GET {base}/address-search/AddressSearch?q=..` answers with a JSON array of
//! GeoJSON point features; `geometry.coordinates` is `[lng, lat]`. An empty
//! array means no match. The service is keyless.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use rentmap_core::Coordinate;

use crate::client::{build_http_client, checked_coordinate, endpoint_url, Geocoder};
use crate::error::GeocodeError;

pub const DEFAULT_BASE_URL: &str = "https://msearch.gsi.go.jp/";
const ENDPOINT: &str = "address-search/AddressSearch";

#[derive(Debug, Deserialize)]
struct GsiFeature {
    geometry: GsiGeometry,
    #[serde(default)]
    properties: Option<GsiProperties>,
}

#[derive(Debug, Deserialize)]
struct GsiGeometry {
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct GsiProperties {
    #[serde(default)]
    title: Option<String>,
}

pub struct GsiGeocoder {
    client: Client,
    endpoint: Url,
}

impl GsiGeocoder {
    /// Creates a geocoder pointed at the production GSI endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, GeocodeError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a geocoder with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be constructed,
    /// or [`GeocodeError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, GeocodeError> {
        Ok(Self {
            client: build_http_client(timeout_secs, user_agent)?,
            endpoint: endpoint_url(base_url, ENDPOINT)?,
        })
    }
}

#[async_trait]
impl Geocoder for GsiGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("q", address);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        let features: Vec<GsiFeature> =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Deserialize {
                context: format!("GSI address search for \"{address}\""),
                source: e,
            })?;

        let Some(first) = features.into_iter().next() else {
            return Err(GeocodeError::NoMatch {
                address: address.to_owned(),
            });
        };

        let coordinate = match first.geometry.coordinates.as_slice() {
            [lng, lat, ..] => checked_coordinate(*lat, *lng),
            _ => None,
        }
        .ok_or_else(|| GeocodeError::MalformedCoordinates {
            raw: format!("{:?}", first.geometry.coordinates),
        })?;

        let matched = first.properties.and_then(|p| p.title).unwrap_or_default();
        tracing::debug!(
            address,
            matched = %matched,
            lat = coordinate.lat,
            lng = coordinate.lng,
            "gsi match"
        );
        Ok(coordinate)
    }
}
