//! Renotification debounce for flapping findings.
//!
//! When a dedup key comes back after being resolved, a notification only goes
//! out if the most recent resolution for that same entity is at least one
//! debounce window old. The alert is persisted either way.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::debug;

use crate::types::Alert;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebouncePolicy {
    window: Duration,
}

impl DebouncePolicy {
    /// A zero window disables suppression.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            window: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Decides whether `candidate` should notify given the latest resolved
    /// alert for its dedup key.
    ///
    /// A resolved alert for a different key, or one with no resolution time,
    /// does not suppress anything.
    #[must_use]
    pub fn should_notify(
        &self,
        candidate: &Alert,
        most_recent_resolved: Option<&Alert>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let Some(resolved) = most_recent_resolved else {
            return true;
        };
        if resolved.dedup_key() != candidate.dedup_key() {
            return true;
        }
        let Some(resolved_at) = resolved.resolved_at else {
            return true;
        };

        let window = TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX);
        let quiet_for = now - resolved_at;
        if quiet_for >= window {
            return true;
        }

        debug!(
            dedup_key = %candidate.dedup_key(),
            resolved_alert = %resolved.id,
            quiet_secs = quiet_for.num_seconds(),
            window_secs = self.window.as_secs(),
            "Suppressing renotification inside debounce window"
        );
        false
    }
}

/// The alert with the latest `resolved_at` among `alerts`.
#[must_use]
pub fn most_recent_resolved(alerts: &[Alert]) -> Option<&Alert> {
    alerts
        .iter()
        .filter(|alert| alert.resolved_at.is_some())
        .max_by_key(|alert| alert.resolved_at)
}
