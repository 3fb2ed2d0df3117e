//! Reading the TOML config file, and seeding it on first run.

use std::io;
use std::path::{Path, PathBuf};

use beacon_common::ConfigError;
use tracing::{info, warn};

use super::template::default_config_toml;
use crate::schema::BeaconConfig;
use crate::validation;

/// `<config dir>/beacon/config.toml`, e.g. `~/.config/beacon/config.toml` on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("beacon").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Parse the file at `path`.
///
/// Missing fields take serde defaults. Validation problems are logged and the
/// parsed values are kept; [`crate::load_config`] is the strict entry point.
pub fn load_from_path(path: &Path) -> Result<BeaconConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
        _ => ConfigError::ParseError(format!("cannot read {}: {e}", path.display())),
    })?;

    let config: BeaconConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "config has invalid values; keeping them");
    }

    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load [`default_config_path`], seeding it with the commented template when
/// it does not exist yet. A template that cannot be written is only logged.
pub fn load_default() -> Result<BeaconConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            match write_template(&path) {
                Ok(()) => info!(path = %path.display(), "wrote default config"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not write default config"),
            }
            Ok(BeaconConfig::default())
        }
        other => other,
    }
}

pub(super) fn write_template(path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, default_config_toml())
}
