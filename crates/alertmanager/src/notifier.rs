//! Notification dispatch collaborator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use notify::{Notifier, NotifyEvent};

use crate::context::ReconcileContext;
use crate::error::NotifyError;
use crate::types::{Alert, EntityKind, Severity};

/// Delivers a notification for one alert.
///
/// Retries and integration-specific formatting belong to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn dispatch_notification(
        &self,
        ctx: &ReconcileContext,
        alert: &Alert,
    ) -> Result<(), NotifyError>;
}

/// Dispatches alerts through every channel of a [`Notifier`] and waits for delivery.
pub struct NotifierDispatcher {
    notifier: Arc<Notifier>,
}

impl NotifierDispatcher {
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier: Arc::new(notifier),
        }
    }

    #[must_use]
    pub fn shared(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }

    /// The notification event describing `alert`.
    #[must_use]
    pub fn event_for(alert: &Alert) -> NotifyEvent {
        NotifyEvent::PolicyViolation {
            alert_id: alert.id.clone(),
            policy_id: alert.policy.id.clone(),
            policy_name: alert.policy.name.clone(),
            severity: match alert.policy.severity {
                Severity::Low => notify::Severity::Low,
                Severity::Medium => notify::Severity::Medium,
                Severity::High => notify::Severity::High,
                Severity::Critical => notify::Severity::Critical,
            },
            entity_kind: match alert.entity.kind {
                EntityKind::Deployment => "Deployment".to_string(),
                EntityKind::Resource => "Resource".to_string(),
            },
            entity_name: alert.entity.name.clone(),
            namespace: alert.entity.namespace.clone(),
            cluster_id: alert.entity.cluster_id.clone(),
            lifecycle_stage: alert.lifecycle_stage.to_string(),
            summary: summarize(alert),
            evidence_count: alert.evidence_count(),
            timestamp: alert.time,
        }
    }
}

#[async_trait]
impl AlertNotifier for NotifierDispatcher {
    async fn dispatch_notification(
        &self,
        _ctx: &ReconcileContext,
        alert: &Alert,
    ) -> Result<(), NotifyError> {
        if !self.notifier.has_channels() {
            debug!(alert_id = %alert.id, "No notification channels, skipping dispatch");
            return Ok(());
        }

        let results = self.notifier.notify_and_wait(Self::event_for(alert)).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(channel, result)| result.err().map(|e| format!("{channel}: {e}")))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Delivery { failures })
        }
    }
}

/// One line describing the alert's evidence, process evidence first.
fn summarize(alert: &Alert) -> String {
    let headline = alert
        .process_violation
        .as_ref()
        .map(|pv| pv.message.as_str())
        .filter(|message| !message.is_empty())
        .or_else(|| alert.violations.first().map(|v| v.message.as_str()))
        .unwrap_or("Policy violated");

    let extra = alert.evidence_count().saturating_sub(1);
    if extra == 0 {
        headline.to_string()
    } else {
        format!("{headline} (+{extra} more)")
    }
}
