//! Configuration schema types for Beacon.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod store;
mod tracker;

pub use logging::*;
pub use store::*;
pub use tracker::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Beacon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub store: StoreConfig,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: BeaconConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.presence_path, "presence");
        assert_eq!(config.tracker.event_capacity, 256);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: BeaconConfig = toml::from_str(
            r#"
[store]
sessions_path = "visits"
"#,
        )
        .unwrap();
        assert_eq!(config.store.sessions_path, "visits");
        assert_eq!(config.store.users_path, "users");
        assert_eq!(config.store.detection_delay_ms, 0);
    }
}
