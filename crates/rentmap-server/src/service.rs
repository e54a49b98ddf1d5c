//! The search backend behind `POST /api/mapping`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rentmap_core::{AppConfig, Listing};
use rentmap_geocoder::Geocoder;
use rentmap_scraper::{
    run_search, ChromiumLauncher, CrawlSettings, ProgressReporter, ScraperError, SearchRequest,
};

#[async_trait]
pub trait MappingService: Send + Sync {
    async fn search(
        &self,
        request: SearchRequest,
        progress: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Vec<Listing>, ScraperError>;
}

/// Runs each search in a fresh headless Chromium session.
pub struct BrowserMappingService {
    launcher: ChromiumLauncher,
    geocoder: Arc<dyn Geocoder>,
    settings: CrawlSettings,
}

impl BrowserMappingService {
    pub fn from_app_config(config: &AppConfig, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            launcher: ChromiumLauncher::from_app_config(config),
            geocoder,
            settings: CrawlSettings::from_app_config(config),
        }
    }
}

#[async_trait]
impl MappingService for BrowserMappingService {
    async fn search(
        &self,
        request: SearchRequest,
        progress: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Vec<Listing>, ScraperError> {
        run_search(
            &self.launcher,
            Arc::clone(&self.geocoder),
            &request,
            &self.settings,
            progress,
            &cancel,
        )
        .await
    }
}
