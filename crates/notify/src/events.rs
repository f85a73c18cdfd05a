//! Notification event types for policy alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of the policy behind a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    /// Immediate action required
    Critical,
}

impl Severity {
    /// Attachment color for this severity.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Low => "#3498db",      // Blue
            Self::Medium => "#f1c40f",   // Yellow
            Self::High => "#f39c12",     // Orange
            Self::Critical => "#e74c3c", // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A policy violation was recorded against an entity for the first time
    /// (or again after its debounce window).
    PolicyViolation {
        alert_id: String,
        policy_id: String,
        policy_name: String,
        severity: Severity,
        entity_kind: String,
        entity_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cluster_id: Option<String>,
        lifecycle_stage: String,
        summary: String,
        evidence_count: usize,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Connectivity check for configured channels.
    Test {
        message: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::PolicyViolation {
                policy_name,
                entity_kind,
                entity_name,
                ..
            } => format!("Policy Violation: {policy_name} on {entity_kind} {entity_name}"),
            Self::Test { .. } => "Test Notification".to_string(),
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::PolicyViolation { severity, .. } => *severity,
            Self::Test { .. } => Severity::Low,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PolicyViolation { timestamp, .. } | Self::Test { timestamp, .. } => *timestamp,
        }
    }
}
