//! Per-user worker tuning.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Queue depth of each per-user worker (valid range: 1-4096).
    pub command_buffer: u32,
    /// Capacity of the engine event bus (valid range: 1-65536).
    pub event_capacity: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            event_capacity: 256,
        }
    }
}
