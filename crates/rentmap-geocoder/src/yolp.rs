//! Yahoo! Open Local Platform (YOLP) geocoder.
//!
//! `GET {base}/geocode/V1/geoCoder?appid=..&query=..` answers with a YDF XML
//! document. The first `Feature/Geometry/Coordinates` element carries the
//! match as `"lng,lat"`; a document with no `Feature` means no match.
//!
//! ```text
//! <YDF>
//!   <ResultInfo><Count>1</Count>...</ResultInfo>
//!   <Feature>
//!     <Name>東京都千代田区丸の内1丁目</Name>
//!     <Geometry><Type>point</Type><Coordinates>139.76712500,35.68123600</Coordinates></Geometry>
//!   </Feature>
//! </YDF>
//! ```

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Url};

use rentmap_core::Coordinate;

use crate::client::{build_http_client, endpoint_url, parse_lng_lat, Geocoder};
use crate::error::GeocodeError;

pub const DEFAULT_BASE_URL: &str = "https://map.yahooapis.jp/";
const ENDPOINT: &str = "geocode/V1/geoCoder";

pub struct YolpGeocoder {
    client: Client,
    app_id: String,
    endpoint: Url,
}

impl YolpGeocoder {
    /// Creates a geocoder pointed at the production YOLP API.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be constructed.
    pub fn new(app_id: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, GeocodeError> {
        Self::with_base_url(app_id, timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a geocoder with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be constructed,
    /// or [`GeocodeError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        app_id: &str,
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, GeocodeError> {
        Ok(Self {
            client: build_http_client(timeout_secs, user_agent)?,
            app_id: app_id.to_owned(),
            endpoint: endpoint_url(base_url, ENDPOINT)?,
        })
    }

    fn request_url(&self, address: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("appid", &self.app_id)
            .append_pair("query", address);
        url
    }
}

#[async_trait]
impl Geocoder for YolpGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let url = self.request_url(address);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // YOLP reports bad app ids and malformed queries as an <Error> document.
            if let Err(err @ GeocodeError::Api(_)) = parse_ydf(&body) {
                return Err(err);
            }
            return Err(GeocodeError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        match parse_ydf(&body)? {
            Some(coordinate) => {
                tracing::debug!(address, lat = coordinate.lat, lng = coordinate.lng, "yolp match");
                Ok(coordinate)
            }
            None => Err(GeocodeError::NoMatch {
                address: address.to_owned(),
            }),
        }
    }
}

/// Extracts the first feature's coordinate from a YDF document.
///
/// Returns `Ok(None)` for a well-formed document without features and
/// [`GeocodeError::Api`] for an `<Error><Message>` document.
pub(crate) fn parse_ydf(xml: &str) -> Result<Option<Coordinate>, GeocodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut error_message: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                if path_ends_with(&path, &["Feature", "Geometry", "Coordinates"]) {
                    return parse_lng_lat(&text).map(Some);
                }
                if path_ends_with(&path, &["Error", "Message"]) {
                    error_message = Some(text.into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match error_message {
        Some(message) => Err(GeocodeError::Api(message)),
        None => Ok(None),
    }
}

fn path_ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}
