//! Reconciliation of detection output against persisted alerts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::context::ReconcileContext;
use crate::debounce::{most_recent_resolved, DebouncePolicy};
use crate::diff::plan;
use crate::error::{PersistFailure, PersistOperation, ReconcileError};
use crate::notifier::AlertNotifier;
use crate::query::{AlertQuery, ScopeFilter};
use crate::store::AlertStore;
use crate::types::{Alert, DedupKey};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Dedup keys whose stored record was created, updated or resolved.
    pub modified: BTreeSet<DedupKey>,
    pub created: usize,
    pub updated: usize,
    pub resolved: usize,
    pub unchanged: usize,
    pub notified: usize,
    /// New alerts persisted without notifying because of the debounce window.
    pub suppressed: usize,
    pub notify_failures: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn modified_ids(&self) -> &BTreeSet<DedupKey> {
        &self.modified
    }

    /// True when the pass changed nothing in the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
    }
}

/// Turns detection passes into a stable, deduplicated set of alerts.
///
/// The manager holds no alert state between calls; every pass reads what it
/// needs from the store. Passes over different scopes may run concurrently.
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn AlertNotifier>,
    debounce: DebouncePolicy,
    call_timeout: Option<Duration>,
}

impl AlertManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn AlertNotifier>,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            debounce: DebouncePolicy::new(config.renotify_debounce),
            call_timeout: config.call_timeout,
        }
    }

    #[must_use]
    pub const fn debounce(&self) -> &DebouncePolicy {
        &self.debounce
    }

    /// Reconciles `current_alerts` against the ACTIVE alerts within scope.
    ///
    /// New keys notify (subject to debounce) before they are persisted, keys
    /// with new evidence are updated silently, and keys no longer detected are
    /// marked stale. A failed write does not stop the rest of the batch; all
    /// failures come back together as [`ReconcileError::Persist`]. A call that
    /// outlives the per-call timeout fails only the alert it was made for.
    /// Cancellation or the context deadline stops the pass immediately.
    #[instrument(skip_all, fields(current = current_alerts.len(), scope = tracing::field::Empty))]
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        current_alerts: Vec<Alert>,
        filters: &[ScopeFilter],
    ) -> Result<ReconcileReport, ReconcileError> {
        let query = AlertQuery::active().with_filters(filters);
        tracing::Span::current().record("scope", tracing::field::display(&query));

        let previous = ctx
            .call(
                "search_alerts",
                self.call_timeout,
                self.store.search_alerts(ctx, &query),
            )
            .await?
            .map_err(|e| {
                error!(error = %e, "Failed to query previous alerts");
                ReconcileError::Query(e)
            })?;

        debug!(previous = previous.len(), "Fetched previous active alerts");

        let plan = plan(current_alerts, previous);
        let mut report = ReconcileReport {
            unchanged: plan.unchanged.len(),
            ..ReconcileReport::default()
        };
        if plan.is_noop() {
            debug!(unchanged = report.unchanged, "No alert changes");
            return Ok(report);
        }

        let now = Utc::now();
        let mut failures = Vec::new();

        for alert in plan.updated_alerts {
            let key = alert.dedup_key();
            match self.upsert(ctx, &alert).await? {
                Ok(()) => {
                    debug!(dedup_key = %key, alert_id = %alert.id, "Merged new evidence");
                    report.updated += 1;
                    report.modified.insert(key);
                }
                Err(failure) => failures.push(failure),
            }
        }

        for alert in plan.new_alerts {
            if let Err(failure) = self.record_new(ctx, alert, now, &mut report).await? {
                failures.push(failure);
            }
        }

        for alert in plan.stale_alerts {
            if let Err(failure) = self.mark_stale(ctx, alert, &mut report).await? {
                failures.push(failure);
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            resolved = report.resolved,
            unchanged = report.unchanged,
            notified = report.notified,
            suppressed = report.suppressed,
            failed = failures.len(),
            "Alert reconciliation complete"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(ReconcileError::Persist { failures })
        }
    }

    /// Notifies (unless debounced) and then persists one newly observed alert.
    async fn record_new(
        &self,
        ctx: &ReconcileContext,
        mut alert: Alert,
        now: DateTime<Utc>,
        report: &mut ReconcileReport,
    ) -> Result<Result<(), PersistFailure>, ReconcileError> {
        if alert.id.is_empty() {
            alert.id = Uuid::new_v4().to_string();
        }
        let key = alert.dedup_key();

        if self.should_notify(ctx, &alert, now).await? {
            let sent = ctx
                .call(
                    "dispatch_notification",
                    self.call_timeout,
                    self.notifier.dispatch_notification(ctx, &alert),
                )
                .await?;
            match sent {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    warn!(dedup_key = %key, alert_id = %alert.id, error = %e, "Failed to send alert notification");
                    report.notify_failures += 1;
                }
            }
        } else {
            report.suppressed += 1;
        }

        let persisted = self.upsert(ctx, &alert).await?;
        if persisted.is_ok() {
            info!(
                dedup_key = %key,
                alert_id = %alert.id,
                policy = %alert.policy.name,
                entity = %alert.entity.name,
                state = %alert.state,
                "Recorded new alert"
            );
            report.created += 1;
            report.modified.insert(key);
        }
        Ok(persisted)
    }

    async fn mark_stale(
        &self,
        ctx: &ReconcileContext,
        alert: Alert,
        report: &mut ReconcileReport,
    ) -> Result<Result<(), PersistFailure>, ReconcileError> {
        let key = alert.dedup_key();
        let result = ctx
            .call(
                "mark_alert_stale",
                self.call_timeout,
                self.store.mark_alert_stale(ctx, &alert.id),
            )
            .await?;

        Ok(match result {
            Ok(()) => {
                info!(dedup_key = %key, alert_id = %alert.id, "Resolved stale alert");
                report.resolved += 1;
                report.modified.insert(key);
                Ok(())
            }
            Err(source) => {
                error!(dedup_key = %key, alert_id = %alert.id, error = %source, "Failed to mark alert stale");
                Err(PersistFailure {
                    key,
                    alert_id: alert.id,
                    operation: PersistOperation::MarkStale,
                    source,
                })
            }
        })
    }

    /// Debounce check for a new alert. A failed lookup notifies.
    async fn should_notify(
        &self,
        ctx: &ReconcileContext,
        alert: &Alert,
        now: DateTime<Utc>,
    ) -> Result<bool, ReconcileError> {
        if !self.debounce.is_enabled() {
            return Ok(true);
        }

        let key = alert.dedup_key();
        let query = AlertQuery::resolved_for(&key);
        let resolved = ctx
            .call(
                "search_resolved_alerts",
                self.call_timeout,
                self.store.search_alerts(ctx, &query),
            )
            .await?;

        match resolved {
            Ok(resolved) => Ok(self
                .debounce
                .should_notify(alert, most_recent_resolved(&resolved), now)),
            Err(e) => {
                warn!(dedup_key = %key, error = %e, "Resolved alert lookup failed, notifying anyway");
                Ok(true)
            }
        }
    }

    /// Outer error aborts the pass; inner error is a per-alert failure.
    async fn upsert(
        &self,
        ctx: &ReconcileContext,
        alert: &Alert,
    ) -> Result<Result<(), PersistFailure>, ReconcileError> {
        let result = ctx
            .call(
                "upsert_alert",
                self.call_timeout,
                self.store.upsert_alert(ctx, alert),
            )
            .await?;

        Ok(result.map_err(|source| {
            error!(dedup_key = %alert.dedup_key(), alert_id = %alert.id, error = %source, "Failed to upsert alert");
            PersistFailure {
                key: alert.dedup_key(),
                alert_id: alert.id.clone(),
                operation: PersistOperation::Upsert,
                source,
            }
        }))
    }
}
