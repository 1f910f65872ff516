//! Configuration Module
//!
//! Per-memoizer options (the time-to-live) and process-wide tuning of the
//! eviction sweep, loaded from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MemoError, Result};

/// Default interval between eviction sweeps in milliseconds
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;

/// Default delay before an evicted stream's backing handle is deleted
pub const DEFAULT_RELEASE_GRACE_MS: u64 = 1000;

// == Memo Options ==
/// Options accepted when wrapping a function.
///
/// Deserializes from `{"forget": {"after": 1000}}`. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoOptions {
    /// Time-based eviction settings
    pub forget: Option<ForgetOptions>,
}

/// Time-based eviction settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgetOptions {
    /// Maximum cell age in milliseconds; absent or zero disables eviction
    pub after: Option<u64>,
}

impl MemoOptions {
    /// Options that forget every cell after `millis` milliseconds.
    pub fn forget_after(millis: u64) -> Self {
        Self {
            forget: Some(ForgetOptions {
                after: Some(millis),
            }),
        }
    }

    /// Parses options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MemoError::InvalidArgument(format!("Malformed options: {}", e)))
    }

    /// Returns the configured maximum age, or None when eviction is disabled.
    pub fn max_age(&self) -> Option<Duration> {
        self.forget
            .as_ref()
            .and_then(|forget| forget.after)
            .filter(|&millis| millis > 0)
            .map(Duration::from_millis)
    }
}

// == Memo Config ==
/// Eviction tuning shared by every memoizer in the process.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoConfig {
    /// Interval between eviction sweeps in milliseconds
    pub sweep_interval_ms: u64,
    /// Delay before an evicted stream's handle is deleted, in milliseconds
    pub release_grace_ms: u64,
}

impl MemoConfig {
    /// Creates a new MemoConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_SWEEP_INTERVAL_MS` - Sweep frequency (default: 1000)
    /// - `MEMO_RELEASE_GRACE_MS` - Grace delay before deleting evicted streams (default: 1000)
    pub fn from_env() -> Self {
        Self {
            sweep_interval_ms: env::var("MEMO_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            release_grace_ms: env::var("MEMO_RELEASE_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RELEASE_GRACE_MS),
        }
    }

    /// Rejects settings the eviction task cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(MemoError::InvalidArgument(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn release_grace(&self) -> Duration {
        Duration::from_millis(self.release_grace_ms)
    }
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            release_grace_ms: DEFAULT_RELEASE_GRACE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MemoConfig::default();
        assert_eq!(config.sweep_interval_ms, 1000);
        assert_eq!(config.release_grace_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MEMO_SWEEP_INTERVAL_MS");
        env::remove_var("MEMO_RELEASE_GRACE_MS");

        let config = MemoConfig::from_env();
        assert_eq!(config, MemoConfig::default());
    }

    #[test]
    fn test_config_zero_interval_rejected() {
        let config = MemoConfig {
            sweep_interval_ms: 0,
            release_grace_ms: 10,
        };
        assert!(matches!(
            config.validate(),
            Err(MemoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_options_default_disables_forgetting() {
        assert_eq!(MemoOptions::default().max_age(), None);
    }

    #[test]
    fn test_options_forget_after() {
        let options = MemoOptions::forget_after(1500);
        assert_eq!(options.max_age(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_options_zero_is_falsy() {
        assert_eq!(MemoOptions::forget_after(0).max_age(), None);
    }

    #[test]
    fn test_options_from_json() {
        let options = MemoOptions::from_json(r#"{"forget":{"after":1000}}"#).unwrap();
        assert_eq!(options.max_age(), Some(Duration::from_millis(1000)));

        let options = MemoOptions::from_json(r#"{"forget":{}}"#).unwrap();
        assert_eq!(options.max_age(), None);

        let options = MemoOptions::from_json(r#"{"forget":null}"#).unwrap();
        assert_eq!(options.max_age(), None);

        let options = MemoOptions::from_json("{}").unwrap();
        assert_eq!(options, MemoOptions::default());
    }

    #[test]
    fn test_options_malformed_json() {
        let result = MemoOptions::from_json(r#"{"forget":{"after":"soon"}}"#);
        assert!(matches!(result, Err(MemoError::InvalidArgument(_))));
    }
}
