use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{DEFAULT_LIVENESS_TIMEOUT_SECS, UART_CHUNK_SIZE};
use crate::core::bluetooth::uart::WriteFailurePolicy;

/// Per-peripheral session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds without an advertisement before a traversed device goes disabled
    pub liveness_timeout_secs: u64,
    /// Largest UART write, in bytes
    pub chunk_size: usize,
    /// Behaviour of the remaining chunks after a failed UART write
    pub write_failure_policy: WriteFailurePolicy,
    /// Upper bound for each connect/discover/read request. `None` waits forever.
    pub operation_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            liveness_timeout_secs: DEFAULT_LIVENESS_TIMEOUT_SECS,
            chunk_size: UART_CHUNK_SIZE,
            write_failure_policy: WriteFailurePolicy::Abort,
            operation_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{ "chunk_size": 64 }"#).unwrap();
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.liveness_timeout(), Duration::from_secs(20));
        assert_eq!(config.write_failure_policy, WriteFailurePolicy::Abort);
        assert_eq!(config.operation_timeout(), None);
    }
}
