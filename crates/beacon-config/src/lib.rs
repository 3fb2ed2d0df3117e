//! Beacon configuration system.
//!
//! TOML-based configuration for the presence engine. All sections use
//! `serde(default)` so a partial file (or none at all) works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use beacon_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("sessions live under /{}", config.store.sessions_path);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BeaconConfig, LogLevel, LoggingConfig, StoreConfig, TrackerConfig, CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{load_default, load_from_path};

use beacon_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Unlike [`load_from_path`], validation failures are returned as errors.
pub fn load_config() -> Result<BeaconConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &BeaconConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
