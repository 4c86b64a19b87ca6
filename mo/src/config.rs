//! Mosaic configuration types and loading

use eyre::{Context, Result, eyre};
use mosaic_adapter::AdapterConfig;
use mosaic_core::coordinator::CoordinatorConfig;
use mosaic_core::target::DEFAULT_ACTIVE;
use mosaic_core::{RelayConfig, TargetId, TargetRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main Mosaic configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Working set of targets
    pub targets: TargetsConfig,

    /// Broadcast and extraction settings
    pub coordinator: CoordinatorConfig,

    /// In-frame adapter timings and trust
    pub adapter: AdapterConfig,

    /// Relay limits
    pub relay: RelayConfig,
}

/// Target selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Targets active at startup, in display order
    pub active: Vec<String>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            active: DEFAULT_ACTIVE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise `./.mosaic.yml`, then
    /// `<config_dir>/mosaic/mosaic.yml`; a candidate that fails to parse or names
    /// unknown targets is skipped with a warning.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        info!("No usable config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first
    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(".mosaic.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("mosaic").join("mosaic.yml"));
        }
        candidates
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        let active = self.active_targets(&TargetRegistry::builtin())?;
        if active.is_empty() {
            return Err(eyre!("targets.active is empty"));
        }
        if self.coordinator.extract_timeout_ms == 0 {
            return Err(eyre!("coordinator.extract-timeout-ms must be positive"));
        }
        Ok(())
    }

    /// Configured active targets, checked against the registry
    pub fn active_targets(&self, registry: &TargetRegistry) -> Result<Vec<TargetId>> {
        debug!(active = ?self.targets.active, "Config::active_targets: called");
        self.targets
            .active
            .iter()
            .map(|id| {
                if registry.contains(id) {
                    Ok(TargetId::from(id.as_str()))
                } else {
                    Err(eyre!("Unknown target '{}' in targets.active", id))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::AttachmentPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.targets.active.len(), 6);
        assert_eq!(config.coordinator.extract_timeout_ms, 10_000);
        assert_eq!(config.adapter.coordinator_origin_prefix, "chrome-extension://");
        assert_eq!(config.relay.max_text_chars, 100_000);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

targets:
  active: [claude, deepseek]

coordinator:
  extract-timeout-ms: 4000
  attachment-policy: reject

adapter:
  locate-timeout-ms: 2500
  submit-delay-ms: 100

relay:
  max-text-chars: 5000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.targets.active, vec!["claude", "deepseek"]);
        assert_eq!(config.coordinator.extract_timeout_ms, 4000);
        assert_eq!(config.coordinator.channel_buffer, 1000);
        assert_eq!(config.coordinator.attachment_policy, AttachmentPolicy::Reject);
        assert_eq!(config.adapter.locate_timeout_ms, 2500);
        assert_eq!(config.adapter.submit_delay_ms, Some(100));
        assert_eq!(config.adapter.image_settle_base_ms, 1500);
        assert_eq!(config.relay.max_text_chars, 5000);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "targets:\n  active: [grok]").unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.targets.active, vec!["grok"]);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/mosaic.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_active_target() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "targets:\n  active: [claude, bard]").unwrap();
        let path = file.path().to_path_buf();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("bard"));
    }

    #[test]
    fn test_validate_rejects_empty_active_set_and_zero_timeout() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.coordinator.extract_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.targets.active.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_targets_rejects_unknown() {
        let registry = TargetRegistry::builtin();
        let mut config = Config::default();
        assert_eq!(config.active_targets(&registry).unwrap().len(), 6);

        config.targets.active.push("bard".to_string());
        assert!(config.active_targets(&registry).is_err());
    }
}
