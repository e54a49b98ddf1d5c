//! In-process pub/sub for crawl progress, keyed by client session id.
//!
//! The SSE endpoint subscribes to a session's topic; the mapping handler
//! publishes into it through [`SessionProgress`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use rentmap_scraper::{CrawlProgress, ProgressReporter};

#[derive(Clone)]
pub struct ProgressHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<CrawlProgress>>>>,
    capacity: usize,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publishes to a session. No-op when nobody is subscribed.
    pub async fn publish(&self, session_id: &str, progress: CrawlProgress) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(session_id) {
            let _ = tx.send(progress);
        }
    }

    /// Subscribes to a session, creating its channel on first use.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<CrawlProgress> {
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops channels nobody listens to anymore.
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports one request's crawl progress to its session topic, if the client
/// supplied a session id.
pub struct SessionProgress {
    hub: ProgressHub,
    session_id: Option<String>,
}

impl SessionProgress {
    pub fn new(hub: ProgressHub, session_id: Option<String>) -> Self {
        Self { hub, session_id }
    }
}

#[async_trait]
impl ProgressReporter for SessionProgress {
    async fn report(&self, progress: CrawlProgress) {
        if let Some(session_id) = &self.session_id {
            self.hub.publish(session_id, progress).await;
        }
    }
}
