//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::request::AttachmentPolicy;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-target extraction deadline in milliseconds
    #[serde(rename = "extract-timeout-ms", default = "default_extract_timeout_ms")]
    pub extract_timeout_ms: u64,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// What to do with attachments that fail validation when composing a send
    #[serde(rename = "attachment-policy", default)]
    pub attachment_policy: AttachmentPolicy,
}

fn default_extract_timeout_ms() -> u64 {
    debug!("default_extract_timeout_ms: called");
    10_000
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            extract_timeout_ms: default_extract_timeout_ms(),
            channel_buffer: default_channel_buffer(),
            attachment_policy: AttachmentPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Get the default extraction deadline as a Duration
    pub fn extract_timeout(&self) -> Duration {
        debug!(extract_timeout_ms = %self.extract_timeout_ms, "CoordinatorConfig::extract_timeout: called");
        Duration::from_millis(self.extract_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.extract_timeout_ms, 10_000);
        assert_eq!(config.channel_buffer, 1000);
        assert_eq!(config.attachment_policy, AttachmentPolicy::Drop);
    }

    #[test]
    fn test_extract_timeout_duration() {
        let config = CoordinatorConfig {
            extract_timeout_ms: 2500,
            ..Default::default()
        };
        assert_eq!(config.extract_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{"attachment-policy": "reject"}"#).unwrap();
        assert_eq!(config.attachment_policy, AttachmentPolicy::Reject);
        assert_eq!(config.extract_timeout_ms, 10_000);
    }
}
