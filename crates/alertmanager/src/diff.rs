//! Three-way diff between freshly detected alerts and stored active alerts.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::merge::{merge_alerts, merge_evidence};
use crate::types::{Alert, DedupKey, ViolationState};

/// Disjoint partition of one detection pass against the stored state.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Keys seen only now (plus every ATTEMPTED alert). Notify, then persist.
    pub new_alerts: Vec<Alert>,
    /// Keys seen in both passes whose merged record differs from storage.
    pub updated_alerts: Vec<Alert>,
    /// Keys no longer detected. Their stored records go stale.
    pub stale_alerts: Vec<Alert>,
    /// Keys seen in both passes with nothing to write.
    pub unchanged: Vec<DedupKey>,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new_alerts.is_empty() && self.updated_alerts.is_empty() && self.stale_alerts.is_empty()
    }
}

/// Partitions `current` against `previous` by dedup key.
///
/// ATTEMPTED alerts record an enforcement attempt and never fold into an
/// active record. Duplicate current alerts for one key are merged into the
/// first. Of duplicate previous records only the first is reconciled; the rest
/// are superseded and go stale.
#[must_use]
pub fn plan(current: Vec<Alert>, previous: Vec<Alert>) -> ReconcilePlan {
    let mut result = ReconcilePlan::default();

    let mut current_by_key: BTreeMap<DedupKey, Alert> = BTreeMap::new();
    for alert in current {
        if alert.state == ViolationState::Attempted {
            result.new_alerts.push(alert);
            continue;
        }
        match current_by_key.entry(alert.dedup_key()) {
            Entry::Vacant(slot) => {
                slot.insert(alert);
            }
            Entry::Occupied(mut slot) => {
                debug!(dedup_key = %slot.key(), "Folding duplicate detection into first");
                merge_evidence(&alert, slot.get_mut());
            }
        }
    }

    let mut previous_by_key: BTreeMap<DedupKey, Alert> = BTreeMap::new();
    let mut superseded = Vec::new();
    for alert in previous {
        match previous_by_key.entry(alert.dedup_key()) {
            Entry::Vacant(slot) => {
                slot.insert(alert);
            }
            Entry::Occupied(slot) => {
                warn!(
                    dedup_key = %slot.key(),
                    kept = %slot.get().id,
                    superseded = %alert.id,
                    "Multiple active alerts share a dedup key"
                );
                superseded.push(alert);
            }
        }
    }

    for (key, alert) in current_by_key {
        match previous_by_key.remove(&key) {
            Some(previous) => match merge_alerts(&previous, alert) {
                Some(merged) => result.updated_alerts.push(merged),
                None => result.unchanged.push(key),
            },
            None => result.new_alerts.push(alert),
        }
    }

    result.stale_alerts = previous_by_key.into_values().chain(superseded).collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, LifecycleStage, PolicyRef, ProcessIndicator, Severity, Violation};
    use chrono::{TimeZone, Utc};

    fn alert(n: u32) -> Alert {
        Alert::new(
            PolicyRef::new(format!("policy{n}"), format!("latest{n}"), Severity::Low),
            Entity::deployment(format!("dep{n}"), format!("deployment{n}")),
            LifecycleStage::Deploy,
        )
        .with_id(format!("alert{n}"))
        .with_time(Utc.timestamp_opt(i64::from(n) * 100, 0).unwrap())
    }

    fn runtime(n: u32) -> Alert {
        let mut alert = alert(n);
        alert.lifecycle_stage = LifecycleStage::Runtime;
        alert
    }

    #[test]
    fn test_identical_passes_are_noop() {
        let alerts = vec![alert(1), alert(2), alert(3)];
        let plan = plan(alerts.clone(), alerts);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged.len(), 3);
    }

    #[test]
    fn test_dropped_key_goes_stale() {
        let previous = vec![alert(1), alert(2), alert(3)];
        let plan = plan(previous[1..].to_vec(), previous);
        assert!(plan.new_alerts.is_empty());
        assert!(plan.updated_alerts.is_empty());
        assert_eq!(plan.stale_alerts.len(), 1);
        assert_eq!(plan.stale_alerts[0].id, "alert1");
    }

    #[test]
    fn test_unseen_key_is_new() {
        let current = vec![alert(1), alert(2), alert(3)];
        let plan = plan(current.clone(), current[1..].to_vec());
        assert_eq!(plan.new_alerts, vec![alert(1)]);
        assert!(plan.stale_alerts.is_empty());
    }

    #[test]
    fn test_runtime_evidence_update_is_planned() {
        let previous = runtime(1).with_violations([Violation::generic("old")]);
        let current = runtime(1)
            .with_id("")
            .with_violations([Violation::generic("new")]);
        let plan = plan(vec![current], vec![previous]);
        assert_eq!(plan.updated_alerts.len(), 1);
        let updated = &plan.updated_alerts[0];
        assert_eq!(updated.id, "alert1");
        assert_eq!(
            updated.violations,
            vec![Violation::generic("new"), Violation::generic("old")]
        );
    }

    #[test]
    fn test_attempted_alerts_are_always_new() {
        let previous = alert(1);
        let attempted = alert(1).with_id("").with_state(ViolationState::Attempted);
        let plan = plan(vec![attempted.clone()], vec![previous]);
        assert_eq!(plan.new_alerts, vec![attempted]);
        assert_eq!(plan.stale_alerts.len(), 1);
    }

    #[test]
    fn test_duplicate_current_alerts_are_folded() {
        let now = Utc::now();
        let first = runtime(1).with_id("").with_processes([ProcessIndicator::new("sh", now)]);
        let second = runtime(1)
            .with_id("")
            .with_processes([ProcessIndicator::new("curl", now)]);
        let plan = plan(vec![first, second], vec![]);
        assert_eq!(plan.new_alerts.len(), 1);
        assert_eq!(plan.new_alerts[0].processes().len(), 2);
    }

    #[test]
    fn test_duplicate_previous_records_go_stale() {
        let kept = alert(1);
        let extra = alert(1).with_id("alert1-dup");
        let plan = plan(vec![alert(1).with_id("")], vec![kept, extra]);
        assert_eq!(plan.unchanged, vec![DedupKey::new("policy1", "dep1")]);
        assert!(plan.new_alerts.is_empty());
        assert!(plan.updated_alerts.is_empty());
        let stale: Vec<_> = plan.stale_alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(stale, ["alert1-dup"]);
    }

    #[test]
    fn test_undetected_key_stales_every_duplicate() {
        let plan = plan(vec![], vec![alert(1), alert(1).with_id("alert1-dup")]);
        let stale: Vec<_> = plan.stale_alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(stale, ["alert1", "alert1-dup"]);
    }
}
