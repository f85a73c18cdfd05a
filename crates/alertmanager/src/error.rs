//! Error types for alert reconciliation.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::DedupKey;

/// A single collaborator call outlived the configured per-call timeout.
///
/// Only that call fails; the surrounding pass carries on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} timed out after {timeout:?}")]
pub struct CallTimeout {
    pub operation: &'static str,
    pub timeout: Duration,
}

/// Errors returned by an alert store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The caller is not authorized for the requested records.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("alert not found: {id}")]
    NotFound { id: String },

    /// Backend could not be reached or timed out
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

impl From<CallTimeout> for StoreError {
    fn from(timeout: CallTimeout) -> Self {
        Self::Unavailable(timeout.to_string())
    }
}

/// Errors returned by a notification dispatcher.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// One or more channels failed to deliver.
    #[error("notification delivery failed: {}", .failures.join("; "))]
    Delivery { failures: Vec<String> },

    #[error(transparent)]
    Timeout(#[from] CallTimeout),

    #[error("{0}")]
    Other(String),
}

/// Invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration for {var}: {value:?}: {source}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// Write that failed while applying a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOperation {
    Upsert,
    MarkStale,
}

impl fmt::Display for PersistOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert => f.write_str("upsert"),
            Self::MarkStale => f.write_str("mark stale"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub key: DedupKey,
    pub alert_id: String,
    pub operation: PersistOperation,
    pub source: StoreError,
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of alert {} ({}) failed: {}",
            self.operation, self.alert_id, self.key, self.source
        )
    }
}

/// Errors returned by [`AlertManager::reconcile`](crate::AlertManager::reconcile).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Previous alerts could not be fetched; nothing was written.
    #[error("failed to query previous alerts: {0}")]
    Query(#[source] StoreError),

    /// Some writes failed. Every other key in the batch was still processed.
    #[error("{} alert write(s) failed: {}", .failures.len(), summarize(.failures))]
    Persist { failures: Vec<PersistFailure> },

    #[error("reconciliation cancelled")]
    Cancelled,

    /// The pass deadline carried by the context passed.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },
}

impl ReconcileError {
    /// Whether the store denied access for any part of the call.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::Query(source) => source.is_access_denied(),
            Self::Persist { failures } => failures.iter().any(|f| f.source.is_access_denied()),
            Self::Cancelled | Self::DeadlineExceeded { .. } => false,
        }
    }
}

fn summarize(failures: &[PersistFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_is_distinguishable() {
        let err = ReconcileError::Query(StoreError::AccessDenied("alerts".to_string()));
        assert!(err.is_access_denied());
        assert_eq!(
            err.to_string(),
            "failed to query previous alerts: access denied: alerts"
        );

        let err = ReconcileError::Query(StoreError::Unavailable("db down".to_string()));
        assert!(!err.is_access_denied());
    }

    #[test]
    fn test_call_timeout_becomes_store_unavailable() {
        let timeout = CallTimeout {
            operation: "upsert_alert",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            StoreError::from(timeout.clone()),
            StoreError::Unavailable("upsert_alert timed out after 5s".to_string())
        );
        assert_eq!(
            NotifyError::from(timeout).to_string(),
            "upsert_alert timed out after 5s"
        );
    }

    #[test]
    fn test_persist_error_lists_every_failure() {
        let err = ReconcileError::Persist {
            failures: vec![
                PersistFailure {
                    key: DedupKey::new("p1", "d1"),
                    alert_id: "a1".to_string(),
                    operation: PersistOperation::Upsert,
                    source: StoreError::Other("boom".to_string()),
                },
                PersistFailure {
                    key: DedupKey::new("p2", "d2"),
                    alert_id: "a2".to_string(),
                    operation: PersistOperation::MarkStale,
                    source: StoreError::AccessDenied("write".to_string()),
                },
            ],
        };
        assert!(err.is_access_denied());
        assert_eq!(
            err.to_string(),
            "2 alert write(s) failed: upsert of alert a1 (p1/d1) failed: boom; \
             mark stale of alert a2 (p2/d2) failed: access denied: write"
        );
    }
}
