//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Run a refresh cycle before any version is known, adopting the version
    /// the observers' fetches report
    #[serde(rename = "cold-start-fetch", default = "default_cold_start_fetch")]
    pub cold_start_fetch: bool,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_cold_start_fetch() -> bool {
    debug!("default_cold_start_fetch: called");
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            channel_buffer: default_channel_buffer(),
            cold_start_fetch: default_cold_start_fetch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.channel_buffer, 256);
        assert!(config.cold_start_fetch);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CoordinatorConfig = serde_yaml::from_str("cold-start-fetch: false").unwrap();
        assert!(!config.cold_start_fetch);
        assert_eq!(config.channel_buffer, 256);
    }
}
