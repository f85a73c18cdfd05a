//! Alert persistence collaborator.
//!
//! Authorization scoping is the store's concern: an implementation enforces
//! it on every call and reports refusals as [`StoreError::AccessDenied`].

mod memory;

pub use memory::MemoryAlertStore;

use async_trait::async_trait;

use crate::context::ReconcileContext;
use crate::error::StoreError;
use crate::query::AlertQuery;
use crate::types::Alert;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Returns every alert matching `query`.
    async fn search_alerts(
        &self,
        ctx: &ReconcileContext,
        query: &AlertQuery,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Creates or replaces the alert keyed by `alert.id`. Must be idempotent.
    async fn upsert_alert(&self, ctx: &ReconcileContext, alert: &Alert) -> Result<(), StoreError>;

    /// Transitions the alert to RESOLVED and stamps `resolved_at` with now.
    async fn mark_alert_stale(&self, ctx: &ReconcileContext, id: &str) -> Result<(), StoreError>;
}
