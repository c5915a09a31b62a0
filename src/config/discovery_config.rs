use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::DEFAULT_CONNECT_DELAY_MS;

/// Scan and first-connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Pause between first sighting a device and connecting to it
    pub connect_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            connect_delay_ms: DEFAULT_CONNECT_DELAY_MS,
        }
    }
}

impl DiscoveryConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }
}
