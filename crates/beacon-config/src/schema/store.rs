//! Backing store layout and in-memory store behavior.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the engine keeps its records, and how the in-memory store behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Top-level key holding one child per session record.
    pub sessions_path: String,
    /// Top-level key holding one `true` flag per online user.
    pub presence_path: String,
    /// Top-level key holding per-user data, including the current-session pointer.
    pub users_path: String,
    /// Delay before the in-memory store applies disconnect-triggered
    /// mutations after a connection drop (valid range: 0-120000).
    pub detection_delay_ms: u32,
}

impl StoreConfig {
    pub fn detection_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.detection_delay_ms))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sessions_path: "sessions".into(),
            presence_path: "presence".into(),
            users_path: "users".into(),
            detection_delay_ms: 0,
        }
    }
}
