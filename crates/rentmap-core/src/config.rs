use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment, GeocoderProvider, MIN_COLLISION_JITTER_DEG};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let env = parse_environment(&or_default("RENTMAP_ENV", "development"));

    let bind_addr = or_default("RENTMAP_BIND_ADDR", "0.0.0.0:3001")
        .parse::<std::net::SocketAddr>()
        .map_err(|e| invalid("RENTMAP_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("RENTMAP_LOG_LEVEL", "info");

    let geocoder = parse_geocoder_provider(&or_default("RENTMAP_GEOCODER", "yolp"))
        .ok_or_else(|| invalid("RENTMAP_GEOCODER", "expected \"yolp\" or \"gsi\"".to_string()))?;
    let yolp_app_id = lookup("RENTMAP_YOLP_APP_ID")
        .ok()
        .filter(|s| !s.trim().is_empty());
    if geocoder == GeocoderProvider::Yolp && yolp_app_id.is_none() {
        return Err(ConfigError::MissingEnvVar("RENTMAP_YOLP_APP_ID".to_string()));
    }
    let geocoder_base_url = lookup("RENTMAP_GEOCODER_BASE_URL").ok();
    let geocoder_timeout_secs = parse_u64("RENTMAP_GEOCODER_TIMEOUT_SECS", "10")?;
    let user_agent = or_default("RENTMAP_USER_AGENT", "rentmap/0.1 (listing-map)");

    let browser_headless = parse_bool(&or_default("RENTMAP_BROWSER_HEADLESS", "true"))
        .ok_or_else(|| invalid("RENTMAP_BROWSER_HEADLESS", "expected a boolean".to_string()))?;
    let browser_executable = lookup("RENTMAP_BROWSER_EXECUTABLE").ok().map(PathBuf::from);

    let navigation_timeout_secs = parse_u64("RENTMAP_NAVIGATION_TIMEOUT_SECS", "30")?;
    let crawl_timeout_secs = parse_u64("RENTMAP_CRAWL_TIMEOUT_SECS", "600")?;
    let crawl_max_pages = parse_usize("RENTMAP_CRAWL_MAX_PAGES", "50")?;
    if crawl_max_pages == 0 {
        return Err(invalid("RENTMAP_CRAWL_MAX_PAGES", "must be at least 1".to_string()));
    }
    let inter_page_delay_ms = parse_u64("RENTMAP_INTER_PAGE_DELAY_MS", "1000")?;

    let collision_jitter_deg = or_default("RENTMAP_COLLISION_JITTER_DEG", "0.002")
        .parse::<f64>()
        .map_err(|e| invalid("RENTMAP_COLLISION_JITTER_DEG", e.to_string()))?;
    if !(collision_jitter_deg.is_finite() && collision_jitter_deg >= MIN_COLLISION_JITTER_DEG) {
        return Err(invalid(
            "RENTMAP_COLLISION_JITTER_DEG",
            format!("must be at least {MIN_COLLISION_JITTER_DEG} degrees"),
        ));
    }

    let rate_limit_per_minute = parse_usize("RENTMAP_RATE_LIMIT_PER_MINUTE", "10")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        geocoder,
        yolp_app_id,
        geocoder_base_url,
        geocoder_timeout_secs,
        user_agent,
        browser_headless,
        browser_executable,
        navigation_timeout_secs,
        crawl_timeout_secs,
        crawl_max_pages,
        inter_page_delay_ms,
        collision_jitter_deg,
        rate_limit_per_minute,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_geocoder_provider(s: &str) -> Option<GeocoderProvider> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yolp" | "yahoo" => Some(GeocoderProvider::Yolp),
        "gsi" => Some(GeocoderProvider::Gsi),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
