//! Chromium-backed [`PageDriver`] over the Chrome DevTools Protocol.
//!
//! Every launch gets its own throw-away profile directory under the system
//! temp dir. The CDP event handler runs on a tracked task that is aborted when
//! the session closes, and the profile directory is removed afterwards.
//!
//! Before each click the current document is tagged with a one-off token on
//! its root element. Settling waits until the tag is gone, so a page that has
//! not started navigating yet is never mistaken for the next one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use rentmap_core::AppConfig;

use crate::error::PageError;
use crate::page::{poll_until_settled, PageDriver, SessionLauncher, SettleSample};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEPARTED_ATTR: &str = "data-rentmap-departed";

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    executable: Option<PathBuf>,
    request_timeout: Duration,
    user_agent: String,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(
        headless: bool,
        executable: Option<PathBuf>,
        request_timeout: Duration,
        user_agent: &str,
    ) -> Self {
        Self {
            headless,
            executable,
            request_timeout,
            user_agent: user_agent.to_owned(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.browser_headless,
            config.browser_executable.clone(),
            Duration::from_secs(config.navigation_timeout_secs),
            &config.user_agent,
        )
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig, PageError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .window_size(1366, 900)
            .user_data_dir(profile_dir)
            .arg(format!("--user-agent={}", self.user_agent))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--mute-audio");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(PageError::Launch)
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, PageError> {
        let profile_dir = std::env::temp_dir().join(format!("rentmap-chromium-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| PageError::Launch(format!("creating profile dir: {e}")))?;

        match start_browser(self, &profile_dir).await {
            Ok((browser, handler, page)) => {
                tracing::info!(profile_dir = %profile_dir.display(), headless = self.headless, "browser launched");
                Ok(ChromiumSession {
                    browser: Mutex::new(Some(browser)),
                    handler,
                    page,
                    departed: Mutex::new(None),
                    profile_dir,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                remove_profile_dir(&profile_dir).await;
                Err(e)
            }
        }
    }
}

async fn start_browser(
    launcher: &ChromiumLauncher,
    profile_dir: &Path,
) -> Result<(Browser, JoinHandle<()>, Page), PageError> {
    let config = launcher.browser_config(profile_dir)?;
    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| PageError::Launch(e.to_string()))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!(error = %e, "browser handler event error");
            }
        }
    });

    match browser.new_page("about:blank").await {
        Ok(page) => Ok((browser, handler_task, page)),
        Err(e) => {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            handler_task.abort();
            Err(PageError::Launch(format!("opening page: {e}")))
        }
    }
}

async fn remove_profile_dir(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove browser profile dir");
    }
}

fn browser_err(e: chromiumoxide::error::CdpError) -> PageError {
    PageError::Browser(e.to_string())
}

/// A launched Chromium instance with a single page.
pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    page: Page,
    /// Token tagged onto the document that was current at the last click.
    departed: Mutex<Option<String>>,
    profile_dir: PathBuf,
    closed: AtomicBool,
}

impl ChromiumSession {
    fn ensure_open(&self) -> Result<(), PageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PageError::Closed);
        }
        Ok(())
    }

    async fn match_count(&self, selector: &str) -> usize {
        self.page
            .find_elements(selector)
            .await
            .map(|elements| elements.len())
            .unwrap_or(0)
    }

    /// Whether the document tagged with `token` is still the current one.
    /// Evaluation fails while a navigation tears the old context down; that
    /// counts as still current.
    async fn still_on(&self, token: &str) -> bool {
        let script = format!(
            "document.documentElement.getAttribute('{DEPARTED_ATTR}') === '{token}'"
        );
        match self.page.evaluate(script.as_str()).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(true),
            Err(_) => true,
        }
    }

    async fn settle_sample(&self, ready_selector: &str, departed: Option<&str>) -> SettleSample {
        let replaced = match departed {
            Some(token) => !self.still_on(token).await,
            None => true,
        };
        let ready_count = if replaced {
            self.match_count(ready_selector).await
        } else {
            0
        };
        SettleSample {
            replaced,
            ready_count,
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumSession {
    type Element = Element;

    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.ensure_open()?;
        tracing::info!(url, "navigating");
        *self.departed.lock().await = None;
        self.page.goto(url).await.map_err(browser_err)?;
        Ok(())
    }

    async fn query_all(
        &self,
        scope: Option<&Element>,
        selector: &str,
    ) -> Result<Vec<Element>, PageError> {
        self.ensure_open()?;
        match scope {
            Some(element) => element.find_elements(selector).await,
            None => self.page.find_elements(selector).await,
        }
        .map_err(browser_err)
    }

    async fn read_text(&self, element: &Element) -> Result<String, PageError> {
        self.ensure_open()?;
        let text = element
            .string_property("textContent")
            .await
            .map_err(browser_err)?;
        Ok(text.unwrap_or_default())
    }

    async fn read_property(&self, element: &Element, name: &str) -> Result<Option<String>, PageError> {
        self.ensure_open()?;
        element.string_property(name).await.map_err(browser_err)
    }

    async fn click(&self, element: &Element) -> Result<(), PageError> {
        self.ensure_open()?;
        let token = Uuid::new_v4().simple().to_string();
        let tag = format!("document.documentElement.setAttribute('{DEPARTED_ATTR}', '{token}')");
        self.page.evaluate(tag.as_str()).await.map_err(browser_err)?;
        *self.departed.lock().await = Some(token);
        element.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn await_settled(&self, ready_selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.ensure_open()?;
        let started = Instant::now();
        let departed = self.departed.lock().await.take();
        let departed = departed.as_deref();

        poll_until_settled(ready_selector, timeout, SETTLE_POLL_INTERVAL, move || {
            self.settle_sample(ready_selector, departed)
        })
        .await?;

        tracing::debug!(
            selector = ready_selector,
            elapsed_ms = started.elapsed().as_millis(),
            "page settled"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), PageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "browser close failed");
                result = Err(browser_err(e));
            }
            if let Err(e) = browser.wait().await {
                tracing::warn!(error = %e, "waiting for browser exit failed");
            }
        }
        self.handler.abort();
        remove_profile_dir(&self.profile_dir).await;
        tracing::info!("browser closed");
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
        if !self.closed.load(Ordering::SeqCst) {
            tracing::warn!("browser session dropped without close; removing profile dir");
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}
