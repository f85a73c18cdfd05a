//! Evidence merging between a stored alert and its freshly detected counterpart.
//!
//! Runtime alerts accumulate evidence across detection passes. Merging is a
//! union over value-equal evidence: nothing already recorded is ever dropped
//! and nothing is recorded twice. Evidence has no natural identifier, so
//! containment is decided by the explicit equality predicates below.

use crate::printer::update_process_violation_message;
use crate::types::{Alert, ProcessIndicator, ProcessViolation, Violation, ViolationKind};

/// Whether two violations are the same piece of evidence.
#[must_use]
pub fn same_violation(a: &Violation, b: &Violation) -> bool {
    if a.message != b.message {
        return false;
    }
    match (&a.kind, &b.kind) {
        (ViolationKind::Generic, ViolationKind::Generic) => true,
        (
            ViolationKind::K8sEvent {
                time: time_a,
                attributes: attrs_a,
            },
            ViolationKind::K8sEvent {
                time: time_b,
                attributes: attrs_b,
            },
        ) => time_a == time_b && attrs_a == attrs_b,
        (
            ViolationKind::NetworkFlow { attributes: attrs_a },
            ViolationKind::NetworkFlow { attributes: attrs_b },
        ) => attrs_a == attrs_b,
        (
            ViolationKind::Generic
            | ViolationKind::K8sEvent { .. }
            | ViolationKind::NetworkFlow { .. },
            _,
        ) => false,
    }
}

/// Whether two process indicators are the same piece of evidence.
#[must_use]
pub fn same_process(a: &ProcessIndicator, b: &ProcessIndicator) -> bool {
    a.container_name == b.container_name
        && a.signal.name == b.signal.name
        && a.signal.exec_file_path == b.signal.exec_file_path
        && a.signal.args == b.signal.args
        && a.signal.uid == b.signal.uid
        && a.signal.time == b.signal.time
}

/// Folds the evidence of `old` into `new`, reporting whether anything changed.
///
/// Only RUNTIME alerts merge; for any other pairing this is a no-op returning
/// `false`. Evidence in `old` missing from `new` is appended after `new`'s own
/// evidence, so the most recent detection stays first. The result is `true`
/// when evidence was carried forward or when `new` holds evidence that `old`
/// lacked, i.e. whenever the merged alert differs from either input.
pub fn merge_evidence(old: &Alert, new: &mut Alert) -> bool {
    if !(old.is_runtime() && new.is_runtime()) {
        return false;
    }

    let fresh = has_fresh_evidence(old, new);
    let carried_processes = merge_processes(old, new);
    let carried_violations = merge_violations(old, new);

    fresh || carried_processes || carried_violations
}

/// Builds the record to persist for a dedup key seen in both passes.
///
/// Returns `None` when the stored record already reflects the detection and
/// no write is needed. Identity (id, state, first-observed time) always comes
/// from `previous`. Non-runtime alerts are replaced wholesale.
#[must_use]
pub fn merge_alerts(previous: &Alert, mut current: Alert) -> Option<Alert> {
    if previous.is_runtime() && current.is_runtime() {
        if !merge_evidence(previous, &mut current) {
            return None;
        }
        carry_identity(previous, &mut current);
        return Some(current);
    }

    carry_identity(previous, &mut current);
    (current != *previous).then_some(current)
}

fn carry_identity(previous: &Alert, current: &mut Alert) {
    current.id.clone_from(&previous.id);
    current.state = previous.state;
    current.time = previous.time;
    current.resolved_at = previous.resolved_at;
}

fn has_fresh_evidence(old: &Alert, new: &Alert) -> bool {
    let fresh_process = new
        .processes()
        .iter()
        .any(|p| !old.processes().iter().any(|q| same_process(p, q)));
    let fresh_violation = new
        .violations
        .iter()
        .any(|v| !old.violations.iter().any(|w| same_violation(v, w)));
    fresh_process || fresh_violation
}

fn merge_processes(old: &Alert, new: &mut Alert) -> bool {
    let carried: Vec<ProcessIndicator> = old
        .processes()
        .iter()
        .filter(|p| !new.processes().iter().any(|q| same_process(p, q)))
        .cloned()
        .collect();
    if carried.is_empty() {
        return false;
    }

    let target = new
        .process_violation
        .get_or_insert_with(ProcessViolation::default);
    target.processes.extend(carried);
    update_process_violation_message(target);
    true
}

fn merge_violations(old: &Alert, new: &mut Alert) -> bool {
    let carried: Vec<Violation> = old
        .violations
        .iter()
        .filter(|v| !new.violations.iter().any(|w| same_violation(v, w)))
        .cloned()
        .collect();
    if carried.is_empty() {
        return false;
    }
    new.violations.extend(carried);
    true
}
