//! Notification delivery for policy alerts.
//!
//! Sends alert notifications to Slack and other messaging platforms when the
//! alert manager records a new policy violation.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! # async fn run() {
//! // Create notifier from environment variables
//! let notifier = Notifier::from_env();
//!
//! // Deliver to every enabled channel and collect per-channel results
//! let results = notifier
//!     .notify_and_wait(NotifyEvent::Test {
//!         message: "hello".to_string(),
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! for (channel, result) in results {
//!     println!("{channel}: {result:?}");
//! }
//! # }
//! ```
//!
//! # Configuration
//!
//! The notifier is configured via environment variables:
//!
//! - `SLACK_WEBHOOK_URL`: Slack incoming webhook URL (enables the Slack channel)
//! - `NOTIFY_DISABLED`: Set to "true" to disable all notifications
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`SlackChannel`] implements Slack webhook notifications
//! - [`Notifier`] dispatches events to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{info, warn};

/// Environment variable to disable all notifications.
pub const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and dispatches
/// events to all enabled channels.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let slack = SlackChannel::from_env();
        if slack.enabled() {
            info!("Slack notifications enabled");
            channels.push(Arc::new(slack));
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && self.channels.iter().any(|c| c.enabled())
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.iter().filter(|c| c.enabled()).count()
        }
    }

    /// Send a notification and wait for every enabled channel to finish.
    ///
    /// Returns one result per channel, in registration order.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if !self.has_channels() {
            return vec![];
        }

        let mut results = vec![];

        for channel in self.channels.iter().filter(|c| c.enabled()) {
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            if let Err(e) = &result {
                warn!(channel = %channel_name, error = %e, "Notification delivery failed");
            }
            results.push((channel_name, result));
        }

        results
    }

    /// Send a test notification to every enabled channel.
    pub async fn send_test(&self, message: impl Into<String>) -> Vec<(String, Result<(), ChannelError>)> {
        self.notify_and_wait(NotifyEvent::Test {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        enabled: bool,
        sent: AtomicUsize,
    }

    impl CountingChannel {
        fn new(enabled: bool) -> Arc<Self> {
            Arc::new(Self {
                enabled,
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotifyChannel for CountingChannel {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _event: &NotifyEvent) -> Result<(), ChannelError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_disabled_notifier() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
        assert_eq!(notifier.channel_count(), 0);
    }

    #[test]
    fn test_severity_colors() {
        assert_eq!(Severity::Low.color(), "#3498db");
        assert_eq!(Severity::High.color(), "#f39c12");
        assert_eq!(Severity::Critical.color(), "#e74c3c");
        assert!(Severity::Critical > Severity::Medium);
    }

    #[test]
    fn test_event_titles() {
        let event = NotifyEvent::Test {
            message: "ping".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.title(), "Test Notification");
        assert_eq!(event.severity(), Severity::Low);
    }

    #[test]
    #[serial]
    fn test_from_env_respects_disable_flag() {
        std::env::set_var(ENV_NOTIFY_DISABLED, "true");
        std::env::set_var(channels::slack::ENV_SLACK_WEBHOOK_URL, "http://localhost/hook");
        let notifier = Notifier::from_env();
        std::env::remove_var(ENV_NOTIFY_DISABLED);
        std::env::remove_var(channels::slack::ENV_SLACK_WEBHOOK_URL);
        assert!(!notifier.has_channels());
    }

    #[test]
    #[serial]
    fn test_from_env_enables_slack() {
        std::env::remove_var(ENV_NOTIFY_DISABLED);
        std::env::set_var(channels::slack::ENV_SLACK_WEBHOOK_URL, "http://localhost/hook");
        let notifier = Notifier::from_env();
        std::env::remove_var(channels::slack::ENV_SLACK_WEBHOOK_URL);
        assert_eq!(notifier.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_notify_and_wait_skips_disabled_channels() {
        let on = CountingChannel::new(true);
        let off = CountingChannel::new(false);
        let channels: Vec<Arc<dyn NotifyChannel>> = vec![on.clone(), off.clone()];
        let notifier = Notifier::with_channels(channels);

        assert_eq!(notifier.channel_count(), 1);
        let results = notifier.send_test("ping").await;

        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        assert_eq!(on.sent.load(Ordering::SeqCst), 1);
        assert_eq!(off.sent.load(Ordering::SeqCst), 0);
    }
}
