//! `POST /api/mapping`: run one listing search and return map-ready listings.
//!
//! A missing, empty, or invalid body is answered with an empty result rather
//! than an error, which is what the map front end expects.

use axum::{body::Bytes, extract::State, Extension, Json};
use reqwest::Url;
use serde::Deserialize;

use rentmap_core::Listing;
use rentmap_scraper::{ScraperError, SearchRequest};

use super::{ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;
use crate::progress_hub::SessionProgress;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingBody {
    url: Option<String>,
    center_address: Option<String>,
    distance: Option<DistanceInput>,
    #[serde(alias = "socketId")]
    session_id: Option<String>,
}

/// Clients send the radius either as a number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DistanceInput {
    Number(f64),
    Text(String),
}

impl DistanceInput {
    fn meters(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug)]
struct MappingRequest {
    search: SearchRequest,
    session_id: Option<String>,
}

/// Parses and validates a request body.
///
/// `Ok(None)` means the body was empty.
fn parse_mapping_request(body: &[u8]) -> Result<Option<MappingRequest>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let body: MappingBody =
        serde_json::from_slice(body).map_err(|e| format!("malformed body: {e}"))?;

    let url = body
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or("url is required")?;
    let parsed = Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported url scheme \"{}\"", parsed.scheme()));
    }

    let center_address = body
        .center_address
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or("centerAddress is required")?;

    let threshold_m = body
        .distance
        .as_ref()
        .and_then(DistanceInput::meters)
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or("distance must be a positive number of meters")?;

    Ok(Some(MappingRequest {
        search: SearchRequest {
            url: parsed.to_string(),
            center_address: center_address.to_owned(),
            threshold_m,
        },
        session_id: body.session_id.filter(|s| !s.trim().is_empty()),
    }))
}

fn empty_response(request_id: String) -> Json<ApiResponse<Vec<Listing>>> {
    Json(ApiResponse {
        data: Vec::new(),
        meta: ResponseMeta::new(request_id),
    })
}

fn map_scraper_error(request_id: String, error: &ScraperError) -> ApiError {
    let code = match error {
        ScraperError::Navigation(_) => "navigation_failed",
        ScraperError::CenterResolution(_) => "center_not_found",
        ScraperError::TimedOut { .. } => "timed_out",
        ScraperError::PaginationLimit { .. } => "pagination_limit",
        ScraperError::Cancelled => "cancelled",
    };
    ApiError::new(request_id, code, error.to_string())
}

pub(super) async fn create_mapping(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ApiResponse<Vec<Listing>>>, ApiError> {
    let request = match parse_mapping_request(&body) {
        Ok(Some(request)) => request,
        Ok(None) => {
            tracing::info!(request_id = %req_id.0, "empty mapping request; nothing to do");
            return Ok(empty_response(req_id.0));
        }
        Err(reason) => {
            tracing::warn!(request_id = %req_id.0, reason = %reason, "ignoring invalid mapping request");
            return Ok(empty_response(req_id.0));
        }
    };

    let cancel = state.shutdown.child_token();
    // Cancels the search if the client goes away and this handler is dropped.
    let _abandon = cancel.clone().drop_guard();

    let service = state.service.clone();
    let reporter = SessionProgress::new(state.progress.clone(), request.session_id.clone());
    let search = request.search;
    let task = tokio::spawn(async move { service.search(search, &reporter, cancel).await });

    let outcome = task.await;
    state.progress.cleanup().await;

    match outcome {
        Ok(Ok(listings)) => {
            tracing::info!(request_id = %req_id.0, listings = listings.len(), "mapping request complete");
            Ok(Json(ApiResponse {
                data: listings,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %req_id.0, error = %e, "mapping request failed");
            Err(map_scraper_error(req_id.0, &e))
        }
        Err(e) => {
            tracing::error!(request_id = %req_id.0, error = %e, "mapping task panicked");
            Err(ApiError::new(req_id.0, "internal_error", "search task failed"))
        }
    }
}
