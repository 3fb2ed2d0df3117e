//! Full configuration validation.
//!
//! Each section has its own check; the orchestrator collects every problem
//! into a single `ConfigError`.

mod helpers;


use crate::schema::BeaconConfig;
use beacon_common::ConfigError;

use helpers::{validate_key, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &BeaconConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_store(&mut errors, config);
    validate_tracker(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_store(errors: &mut Vec<String>, config: &BeaconConfig) {
    let store = &config.store;
    validate_key(errors, "store.sessions_path", &store.sessions_path);
    validate_key(errors, "store.presence_path", &store.presence_path);
    validate_key(errors, "store.users_path", &store.users_path);

    let paths = [&store.sessions_path, &store.presence_path, &store.users_path];
    for (i, a) in paths.iter().enumerate() {
        if paths[i + 1..].contains(a) {
            errors.push(format!("store path \"{a}\" is used for more than one record set"));
        }
    }

    validate_range(
        errors,
        "store.detection_delay_ms",
        store.detection_delay_ms,
        0,
        120_000,
    );
}

fn validate_tracker(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_range(
        errors,
        "tracker.command_buffer",
        config.tracker.command_buffer,
        1,
        4096,
    );
    validate_range(
        errors,
        "tracker.event_capacity",
        config.tracker.event_capacity,
        1,
        65_536,
    );
}
