//! Adapter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::profile::TargetProfile;

/// Adapter timing and trust configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Budget for finding the input surface
    #[serde(rename = "locate-timeout-ms", default = "default_locate_timeout_ms")]
    pub locate_timeout_ms: u64,

    /// Coordinator traffic is accepted only from origins with this prefix
    #[serde(rename = "coordinator-origin-prefix", default = "default_coordinator_origin_prefix")]
    pub coordinator_origin_prefix: String,

    /// Settle time after pasting the first image
    #[serde(rename = "image-settle-base-ms", default = "default_image_settle_base_ms")]
    pub image_settle_base_ms: u64,

    /// Extra settle time per additional image
    #[serde(rename = "image-settle-per-extra-ms", default = "default_image_settle_per_extra_ms")]
    pub image_settle_per_extra_ms: u64,

    /// Delay between the paste and the drop fallback
    #[serde(rename = "drop-delay-ms", default = "default_drop_delay_ms")]
    pub drop_delay_ms: u64,

    /// Overrides every profile's submit delay when set
    #[serde(rename = "submit-delay-ms", default)]
    pub submit_delay_ms: Option<u64>,
}

fn default_locate_timeout_ms() -> u64 {
    debug!("default_locate_timeout_ms: called");
    10_000
}

fn default_coordinator_origin_prefix() -> String {
    debug!("default_coordinator_origin_prefix: called");
    "chrome-extension://".to_string()
}

fn default_image_settle_base_ms() -> u64 {
    1500
}

fn default_image_settle_per_extra_ms() -> u64 {
    500
}

fn default_drop_delay_ms() -> u64 {
    300
}

impl Default for AdapterConfig {
    fn default() -> Self {
        debug!("AdapterConfig::default: called");
        Self {
            locate_timeout_ms: default_locate_timeout_ms(),
            coordinator_origin_prefix: default_coordinator_origin_prefix(),
            image_settle_base_ms: default_image_settle_base_ms(),
            image_settle_per_extra_ms: default_image_settle_per_extra_ms(),
            drop_delay_ms: default_drop_delay_ms(),
            submit_delay_ms: None,
        }
    }
}

impl AdapterConfig {
    /// Config with every delay zeroed, for dry runs
    pub fn immediate() -> Self {
        Self {
            locate_timeout_ms: 0,
            image_settle_base_ms: 0,
            image_settle_per_extra_ms: 0,
            drop_delay_ms: 0,
            submit_delay_ms: Some(0),
            ..Default::default()
        }
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }

    pub fn drop_delay(&self) -> Duration {
        Duration::from_millis(self.drop_delay_ms)
    }

    /// Settle time for `count` pasted images
    pub fn image_settle(&self, count: usize) -> Duration {
        let extra = count.saturating_sub(1) as u64;
        Duration::from_millis(self.image_settle_base_ms + extra * self.image_settle_per_extra_ms)
    }

    pub fn submit_delay(&self, profile: &TargetProfile) -> Duration {
        Duration::from_millis(self.submit_delay_ms.unwrap_or(profile.submit_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_for;

    #[test]
    fn test_image_settle_grows_per_extra_image() {
        let config = AdapterConfig::default();
        assert_eq!(config.image_settle(1), Duration::from_millis(1500));
        assert_eq!(config.image_settle(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_submit_delay_override() {
        let mut config = AdapterConfig::default();
        assert_eq!(config.submit_delay(profile_for("chatgpt")), Duration::from_millis(700));
        config.submit_delay_ms = Some(50);
        assert_eq!(config.submit_delay(profile_for("chatgpt")), Duration::from_millis(50));
    }
}
