pub mod app_config;
pub mod config;
pub mod geo;
pub mod listing;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, GeocoderProvider, MIN_COLLISION_JITTER_DEG};
pub use config::{load_app_config, load_app_config_from_env};
pub use geo::{distance_km, distance_m, Coordinate, EARTH_RADIUS_KM};
pub use listing::{normalize_text, Listing, ListingDraft};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
