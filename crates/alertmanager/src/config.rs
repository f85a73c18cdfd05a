//! Engine configuration.

use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

/// Environment variable holding the renotification debounce window.
pub const ENV_RENOTIFY_DEBOUNCE: &str = "ALERT_RENOTIF_DEBOUNCE_DURATION";

/// Environment variable bounding each store or notifier call.
pub const ENV_COLLABORATOR_TIMEOUT: &str = "ALERT_COLLABORATOR_TIMEOUT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Minimum quiet time after a resolution before a recurrence notifies.
    /// Zero always notifies.
    pub renotify_debounce: Duration,
    /// Upper bound on any single collaborator call.
    pub call_timeout: Option<Duration>,
}

impl ManagerConfig {
    /// Reads configuration from the environment.
    ///
    /// Durations use humantime syntax (`5m`, `90s`, `1h 30m`). Unset or empty
    /// variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let renotify_debounce = duration_var(ENV_RENOTIFY_DEBOUNCE)?.unwrap_or_default();
        let call_timeout = duration_var(ENV_COLLABORATOR_TIMEOUT)?;

        info!(
            debounce_secs = renotify_debounce.as_secs(),
            call_timeout = ?call_timeout,
            "Loaded alert manager configuration"
        );

        Ok(Self {
            renotify_debounce,
            call_timeout,
        })
    }

    #[must_use]
    pub fn with_renotify_debounce(mut self, window: Duration) -> Self {
        self.renotify_debounce = window;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

fn duration_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed == "0" {
        return Ok(Some(Duration::ZERO));
    }
    humantime::parse_duration(trimmed)
        .map(Some)
        .map_err(|source| ConfigError::InvalidDuration {
            var,
            value: value.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_RENOTIFY_DEBOUNCE);
        std::env::remove_var(ENV_COLLABORATOR_TIMEOUT);
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let config = ManagerConfig::from_env().unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert!(config.renotify_debounce.is_zero());
        assert!(config.call_timeout.is_none());
    }

    #[test]
    #[serial]
    fn test_reads_humantime_durations() {
        clear_env();
        std::env::set_var(ENV_RENOTIFY_DEBOUNCE, "5m");
        std::env::set_var(ENV_COLLABORATOR_TIMEOUT, "1500ms");
        let config = ManagerConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.renotify_debounce, Duration::from_secs(300));
        assert_eq!(config.call_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    #[serial]
    fn test_zero_disables_debounce() {
        clear_env();
        std::env::set_var(ENV_RENOTIFY_DEBOUNCE, "0");
        let config = ManagerConfig::from_env().unwrap();
        clear_env();
        assert!(config.renotify_debounce.is_zero());
    }

    #[test]
    #[serial]
    fn test_invalid_duration_is_an_error() {
        clear_env();
        std::env::set_var(ENV_RENOTIFY_DEBOUNCE, "five minutes");
        let err = ManagerConfig::from_env().unwrap_err();
        clear_env();
        assert!(err.to_string().contains(ENV_RENOTIFY_DEBOUNCE));
    }

    #[test]
    fn test_builders() {
        let config = ManagerConfig::default()
            .with_renotify_debounce(Duration::from_secs(60))
            .with_call_timeout(Duration::from_secs(2));
        assert_eq!(config.renotify_debounce, Duration::from_secs(60));
        assert_eq!(config.call_timeout, Some(Duration::from_secs(2)));
    }
}
