//! Pacing configuration.
//!
//! Loaded from ~/.config/pacer/pacer.yml or .pacer.yml

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transport::ChatId;

/// Configuration for the send scheduler.
///
/// Durations are expressed in seconds to keep the YAML surface flat; use the
/// accessor methods to get `Duration` values with the documented clamps
/// applied.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PacerConfig {
    /// Whether sends are routed through the scheduler at all.
    /// When false the facade forwards directly to the transport.
    pub enabled: bool,

    /// Maximum sends across all chats within any trailing 1-second window.
    #[serde(rename = "global-rate-per-sec")]
    pub global_rate_per_sec: u32,

    /// Minimum interval between two sends to the same chat.
    #[serde(rename = "per-chat-cooldown-sec")]
    pub per_chat_cooldown_sec: f64,

    /// Admission delay beyond which a typing indicator masks the wait.
    #[serde(rename = "heavy-load-delay-threshold-sec")]
    pub heavy_load_delay_threshold_sec: f64,

    /// Maximum retry attempts for rate-limited and transient failures.
    #[serde(rename = "max-retry-attempts")]
    pub max_retry_attempts: u32,

    /// Base delay for exponential retry backoff.
    #[serde(rename = "retry-base-delay-sec")]
    pub retry_base_delay_sec: f64,

    /// Queued max delay beyond which the operator is alerted.
    #[serde(rename = "alert-delay-threshold-sec")]
    pub alert_delay_threshold_sec: f64,

    /// Minimum interval between two operator alerts.
    #[serde(rename = "alert-cooldown-sec")]
    pub alert_cooldown_sec: f64,

    /// Operator chat for backlog alerts. No alerts are sent when unset.
    #[serde(rename = "admin-chat-id")]
    pub admin_chat_id: Option<ChatId>,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_rate_per_sec: 30,
            per_chat_cooldown_sec: 1.0,
            heavy_load_delay_threshold_sec: 3.0,
            max_retry_attempts: 3,
            retry_base_delay_sec: 0.5,
            alert_delay_threshold_sec: 6.0,
            alert_cooldown_sec: 300.0,
            admin_chat_id: None,
        }
    }
}

impl PacerConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .pacer.yml in current directory
    /// 3. ~/.config/pacer/pacer.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".pacer.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .pacer.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .pacer.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pacer").join("pacer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.global_rate_per_sec == 0 {
            eyre::bail!("global-rate-per-sec must be > 0");
        }
        if self.per_chat_cooldown_sec < 0.0 {
            eyre::bail!("per-chat-cooldown-sec must be >= 0");
        }
        if self.retry_base_delay_sec < 0.0 {
            eyre::bail!("retry-base-delay-sec must be >= 0");
        }
        if self.alert_cooldown_sec <= 0.0 {
            eyre::bail!("alert-cooldown-sec must be > 0");
        }
        Ok(())
    }

    /// Global window capacity, clamped to at least one send per second.
    pub fn global_rate(&self) -> u32 {
        self.global_rate_per_sec.max(1)
    }

    /// Per-chat cooldown, negative values clamped to zero.
    pub fn per_chat_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.per_chat_cooldown_sec.max(0.0))
    }

    /// Heavy-load threshold for the typing-indicator side signal.
    pub fn heavy_load_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.heavy_load_delay_threshold_sec.max(0.0))
    }

    /// Base delay for exponential retry backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_delay_sec.max(0.0))
    }

    /// Backlog delay beyond which an operator alert fires.
    pub fn alert_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.alert_delay_threshold_sec.max(0.0))
    }

    /// Debounce interval between operator alerts.
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.alert_cooldown_sec.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PacerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.global_rate_per_sec, 30);
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.admin_chat_id.is_none());
        assert!((config.alert_cooldown_sec - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let config = PacerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = PacerConfig {
            global_rate_per_sec: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PacerConfig {
            per_chat_cooldown_sec: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
global-rate-per-sec: 10
per-chat-cooldown-sec: 0.5
admin-chat-id: 4242
"#;
        let config: PacerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.global_rate_per_sec, 10);
        assert!((config.per_chat_cooldown_sec - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.admin_chat_id, Some(ChatId::Int(4242)));
        // Other fields should have defaults
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.enabled);
    }

    #[test]
    fn test_parse_yaml_disabled() {
        let config: PacerConfig = serde_yaml::from_str("enabled: false").unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_duration_accessors_clamp() {
        let config = PacerConfig {
            global_rate_per_sec: 0,
            per_chat_cooldown_sec: -2.0,
            ..Default::default()
        };
        assert_eq!(config.global_rate(), 1);
        assert_eq!(config.per_chat_cooldown(), Duration::ZERO);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pacer.yml");
        fs::write(&path, "global-rate-per-sec: 7\n").unwrap();

        let config = PacerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.global_rate_per_sec, 7);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/pacer.yml");
        assert!(PacerConfig::load(Some(&path)).is_err());
    }
}
