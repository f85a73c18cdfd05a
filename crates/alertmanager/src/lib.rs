//! Alert reconciliation and notification.
//!
//! Each detection pass produces the complete set of policy violations
//! currently observed. [`AlertManager::reconcile`] compares that set with the
//! ACTIVE alerts already stored for the same scope and turns the difference
//! into writes:
//!
//! - keys seen for the first time are notified (subject to the renotification
//!   debounce window) and persisted
//! - keys seen again have runtime evidence merged into the stored record
//! - keys no longer seen are marked stale
//!
//! Storage and notification delivery are collaborators behind the
//! [`AlertStore`] and [`AlertNotifier`] traits. [`MemoryAlertStore`] and
//! [`NotifierDispatcher`] are ready-made implementations.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod debounce;
pub mod diff;
pub mod error;
pub mod manager;
pub mod merge;
pub mod notifier;
pub mod printer;
pub mod query;
pub mod store;
pub mod types;

pub use config::ManagerConfig;
pub use context::ReconcileContext;
pub use debounce::DebouncePolicy;
pub use error::{
    CallTimeout, ConfigError, NotifyError, PersistFailure, PersistOperation, ReconcileError,
    StoreError,
};
pub use manager::{AlertManager, ReconcileReport};
pub use merge::{merge_alerts, merge_evidence};
pub use notifier::{AlertNotifier, NotifierDispatcher};
pub use query::{AlertQuery, ScopeFilter};
pub use store::{AlertStore, MemoryAlertStore};
pub use types::{
    Alert, DedupKey, Entity, EntityKind, KeyValueAttr, LifecycleStage, PolicyRef,
    ProcessIndicator, ProcessSignal, ProcessViolation, Severity, Violation, ViolationKind,
    ViolationState,
};
