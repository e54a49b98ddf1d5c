//! `GET /api/progress/{session_id}`: server-sent crawl progress for one
//! client session.
//!
//! Each event is `event: progress` with a JSON [`CrawlProgress`] payload. The
//! stream ends after the final (`done`) event or when the server shuts down.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::{stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use rentmap_scraper::CrawlProgress;

use super::AppState;

pub(super) async fn stream_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    tracing::debug!(session_id = %session_id, "progress stream opened");
    let rx = state.progress.subscribe(&session_id).await;

    let events = stream::unfold(
        (BroadcastStream::new(rx), false),
        |(mut rx, finished)| async move {
            if finished {
                return None;
            }
            let (event, done) = match rx.next().await? {
                Ok(progress) => (progress_event(&progress), progress.done),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => (
                    Event::default().event("lagged").data(skipped.to_string()),
                    false,
                ),
            };
            Some((Ok::<_, Infallible>(event), (rx, done)))
        },
    )
    .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn progress_event(progress: &CrawlProgress) -> Event {
    let data = serde_json::to_string(progress).unwrap_or_else(|_| "{}".to_owned());
    Event::default().event("progress").data(data)
}
