use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Address resolution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocoderProvider {
    /// Yahoo! Open Local Platform geocoder (XML, requires an app id).
    Yolp,
    /// Geospatial Information Authority of Japan address search (JSON, keyless).
    Gsi,
}

impl std::fmt::Display for GeocoderProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeocoderProvider::Yolp => write!(f, "yolp"),
            GeocoderProvider::Gsi => write!(f, "gsi"),
        }
    }
}

/// Smallest accepted collision jitter, in degrees (about 0.1 mm).
///
/// Offsets much smaller than this round back onto the original coordinate.
pub const MIN_COLLISION_JITTER_DEG: f64 = 1e-9;

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub geocoder: GeocoderProvider,
    pub yolp_app_id: Option<String>,
    pub geocoder_base_url: Option<String>,
    pub geocoder_timeout_secs: u64,
    pub user_agent: String,
    pub browser_headless: bool,
    pub browser_executable: Option<PathBuf>,
    pub navigation_timeout_secs: u64,
    pub crawl_timeout_secs: u64,
    pub crawl_max_pages: usize,
    pub inter_page_delay_ms: u64,
    pub collision_jitter_deg: f64,
    pub rate_limit_per_minute: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("geocoder", &self.geocoder)
            .field(
                "yolp_app_id",
                &self.yolp_app_id.as_ref().map(|_| "[redacted]"),
            )
            .field("geocoder_base_url", &self.geocoder_base_url)
            .field("geocoder_timeout_secs", &self.geocoder_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("browser_headless", &self.browser_headless)
            .field("browser_executable", &self.browser_executable)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("crawl_timeout_secs", &self.crawl_timeout_secs)
            .field("crawl_max_pages", &self.crawl_max_pages)
            .field("inter_page_delay_ms", &self.inter_page_delay_ms)
            .field("collision_jitter_deg", &self.collision_jitter_deg)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish()
    }
}
