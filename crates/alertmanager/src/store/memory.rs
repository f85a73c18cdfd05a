//! In-process alert store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::AlertStore;
use crate::context::ReconcileContext;
use crate::error::StoreError;
use crate::query::AlertQuery;
use crate::types::{Alert, ViolationState};

/// Keeps alerts in a map keyed by id.
///
/// Searches return alerts ordered by first-observed time, then id. Access can
/// be revoked to exercise authorization failures.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
    access_denied: AtomicBool,
}

impl MemoryAlertStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store. Alerts without an id are skipped.
    pub fn with_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let map = alerts
            .into_iter()
            .filter(Alert::is_persisted)
            .map(|alert| (alert.id.clone(), alert))
            .collect();
        Self {
            alerts: RwLock::new(map),
            access_denied: AtomicBool::new(false),
        }
    }

    /// When set, every call fails with [`StoreError::AccessDenied`].
    pub fn set_access_denied(&self, denied: bool) {
        self.access_denied.store(denied, Ordering::SeqCst);
    }

    pub async fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }

    /// Snapshot of every stored alert, in search order.
    pub async fn all(&self) -> Vec<Alert> {
        self.search(&AlertQuery::new()).await
    }

    async fn search(&self, query: &AlertQuery) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let mut found: Vec<Alert> = alerts
            .values()
            .filter(|alert| query.matches(alert))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        found
    }

    fn check_access(&self) -> Result<(), StoreError> {
        if self.access_denied.load(Ordering::SeqCst) {
            return Err(StoreError::AccessDenied(
                "alert store access revoked".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn search_alerts(
        &self,
        _ctx: &ReconcileContext,
        query: &AlertQuery,
    ) -> Result<Vec<Alert>, StoreError> {
        self.check_access()?;
        let found = self.search(query).await;
        debug!(query = %query, count = found.len(), "Searched alerts");
        Ok(found)
    }

    async fn upsert_alert(&self, _ctx: &ReconcileContext, alert: &Alert) -> Result<(), StoreError> {
        self.check_access()?;
        if !alert.is_persisted() {
            return Err(StoreError::Other("cannot upsert alert without an id".to_string()));
        }
        self.alerts
            .write()
            .await
            .insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn mark_alert_stale(&self, _ctx: &ReconcileContext, id: &str) -> Result<(), StoreError> {
        self.check_access()?;
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        if alert.state != ViolationState::Resolved {
            alert.resolve(Utc::now());
        }
        Ok(())
    }
}
