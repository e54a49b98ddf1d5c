use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use rentmap_core::{Coordinate, Listing, ListingDraft};
use rentmap_scraper::{CrawlProgress, PageError, ProgressReporter, ScraperError, SearchRequest};

use super::*;
use crate::service::MappingService;

/// Returns canned listings and reports one progress event per call.
#[derive(Default)]
struct StubService {
    calls: AtomicUsize,
    last_request: Mutex<Option<SearchRequest>>,
    fail_with: Mutex<Option<ScraperError>>,
}

impl StubService {
    fn failing(error: ScraperError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MappingService for StubService {
    async fn search(
        &self,
        request: SearchRequest,
        progress: &dyn ProgressReporter,
        _cancel: CancellationToken,
    ) -> Result<Vec<Listing>, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        progress.report(CrawlProgress::finished(1, 1)).await;
        if let Some(e) = self.fail_with.lock().unwrap().take() {
            return Err(e);
        }
        Ok(vec![ListingDraft {
            title: "Maison Marunouchi".to_owned(),
            address: "東京都千代田区丸の内1".to_owned(),
            ..ListingDraft::default()
        }
        .locate(Coordinate::new(35.68, 139.76))])
    }
}

fn app_with(service: Arc<StubService>, per_minute: usize) -> (Router, AppState) {
    let state = AppState {
        service,
        progress: ProgressHub::new(),
        shutdown: CancellationToken::new(),
    };
    (build_app(state.clone(), rate_limit_state(per_minute)), state)
}

fn post_mapping(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/mapping")
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json parse")
}

const VALID: &str = r#"{"url":"https://suumo.jp/chintai/tokyo/","centerAddress":"Tokyo Station","distance":"1000"}"#;

#[test]
fn api_error_codes_map_to_statuses() {
    let status = |code: &str| ApiError::new("req-1", code, "x").into_response().status();
    assert_eq!(status("navigation_failed"), StatusCode::BAD_GATEWAY);
    assert_eq!(status("center_not_found"), StatusCode::BAD_GATEWAY);
    assert_eq!(status("timed_out"), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(status("rate_limited"), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(status("cancelled"), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = app_with(Arc::new(StubService::default()), 10);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = json_body(response).await;
    assert_eq!(json["data"]["status"], "ok");
    assert!(json["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn mapping_returns_listings_in_data() {
    let service = Arc::new(StubService::default());
    let (app, _) = app_with(service.clone(), 10);

    let response = app.oneshot(post_mapping(VALID)).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let data = json["data"].as_array().expect("data array");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["title"], "Maison Marunouchi");
    assert_eq!(data[0]["coordinate"]["lat"], 35.68);
    assert!(data[0].get("floorPlan").is_some());

    let request = service.last_request.lock().unwrap().clone().expect("called");
    assert_eq!(request.threshold_m, 1000.0);
    assert_eq!(request.center_address, "Tokyo Station");
}

#[tokio::test]
async fn empty_body_is_an_empty_success() {
    let service = Arc::new(StubService::default());
    let (app, _) = app_with(service.clone(), 10);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mapping")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"], serde_json::json!([]));
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_body_is_an_empty_success() {
    let service = Arc::new(StubService::default());
    let (app, _) = app_with(service.clone(), 10);

    let response = app
        .oneshot(post_mapping(r#"{"url":"https://suumo.jp/","centerAddress":"x","distance":"-1"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"], serde_json::json!([]));
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn navigation_failure_is_bad_gateway_without_data() {
    let service = Arc::new(StubService::failing(ScraperError::Navigation(
        PageError::SettleTimeout {
            selector: "ul.l-cassetteitem > li".to_owned(),
            waited_ms: 30_000,
        },
    )));
    let (app, _) = app_with(service, 10);

    let response = app.oneshot(post_mapping(VALID)).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "navigation_failed");
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn timeout_is_gateway_timeout() {
    let service = Arc::new(StubService::failing(ScraperError::TimedOut { limit_secs: 600 }));
    let (app, _) = app_with(service, 10);

    let response = app.oneshot(post_mapping(VALID)).await.expect("response");

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response).await["error"]["code"], "timed_out");
}

#[tokio::test]
async fn mapping_is_rate_limited() {
    let (app, _) = app_with(Arc::new(StubService::default()), 1);

    let first = app.clone().oneshot(post_mapping(VALID)).await.expect("response");
    let second = app.oneshot(post_mapping(VALID)).await.expect("response");

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
    assert_eq!(json_body(second).await["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn progress_is_published_to_the_clients_session() {
    let (app, state) = app_with(Arc::new(StubService::default()), 10);
    let mut rx = state.progress.subscribe("sock-42").await;

    let body = r#"{"url":"https://suumo.jp/chintai/","centerAddress":"Tokyo Station","distance":500,"socketId":"sock-42"}"#;
    let response = app.oneshot(post_mapping(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let event = rx.recv().await.expect("progress event");
    assert!(event.done);
    assert_eq!(event.percent, 100);
}

#[tokio::test]
async fn progress_stream_sends_events_until_done() {
    let (app, state) = app_with(Arc::new(StubService::default()), 10);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/progress/sess-7")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    state
        .progress
        .publish("sess-7", CrawlProgress::page_completed(1, Some(2), true, 3))
        .await;
    state
        .progress
        .publish("sess-7", CrawlProgress::finished(2, 5))
        .await;

    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("stream ends after done");
    let text = String::from_utf8(body.to_vec()).expect("utf8");
    assert_eq!(text.matches("event: progress").count(), 2);
    assert!(text.contains(r#""percent":50"#));
    assert!(text.contains(r#""done":true"#));
}
