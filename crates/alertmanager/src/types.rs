//! Alert data model.
//!
//! An [`Alert`] is the persisted record of a policy violation against one
//! entity. Evidence accumulates on it as [`Violation`]s and, for runtime
//! process policies, as [`ProcessIndicator`]s inside a [`ProcessViolation`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute key carrying the observation time of a network flow.
pub const NETWORK_FLOW_TIMESTAMP_KEY: &str = "NetworkFlowTimestamp";

/// Point in the workload lifecycle at which a policy was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    Build,
    Deploy,
    Runtime,
}

impl LifecycleStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "BUILD",
            Self::Deploy => "DEPLOY",
            Self::Runtime => "RUNTIME",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationState {
    /// The triggering condition is currently observed.
    Active,
    /// The condition is no longer observed; the record is history.
    Resolved,
    /// Enforcement was attempted against the violating entity.
    Attempted,
}

impl ViolationState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Resolved => "RESOLVED",
            Self::Attempted => "ATTEMPTED",
        }
    }
}

impl fmt::Display for ViolationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy severity as configured on the violated policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The policy an alert was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    pub id: String,
    pub name: String,
    pub severity: Severity,
}

impl PolicyRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            severity,
        }
    }
}

/// Kind of object a policy was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Deployment,
    Resource,
}

/// The deployment or resource an alert targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

impl Entity {
    pub fn deployment(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Deployment,
            id: id.into(),
            name: name.into(),
            namespace: None,
            cluster_id: None,
        }
    }

    pub fn resource(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Resource,
            id: id.into(),
            name: name.into(),
            namespace: None,
            cluster_id: None,
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn in_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }
}

/// Identity of a finding across detection passes: (policy, entity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub policy_id: String,
    pub entity_id: String,
}

impl DedupKey {
    pub fn new(policy_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy_id, self.entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueAttr {
    pub key: String,
    pub value: String,
}

impl KeyValueAttr {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Shape of a violation's payload, which differs per evidence kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    Generic,
    K8sEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<KeyValueAttr>,
    },
    NetworkFlow {
        attributes: Vec<KeyValueAttr>,
    },
}

/// One piece of non-process evidence attached to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub message: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ViolationKind::Generic,
        }
    }

    pub fn k8s_event(message: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            kind: ViolationKind::K8sEvent {
                time: Some(time),
                attributes: Vec::new(),
            },
        }
    }

    /// A network-flow violation; the flow time travels as a formatted attribute.
    pub fn network_flow(message: impl Into<String>, flow_time: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            kind: ViolationKind::NetworkFlow {
                attributes: vec![KeyValueAttr::new(
                    NETWORK_FLOW_TIMESTAMP_KEY,
                    flow_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                )],
            },
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            ViolationKind::Generic => "GENERIC",
            ViolationKind::K8sEvent { .. } => "K8S_EVENT",
            ViolationKind::NetworkFlow { .. } => "NETWORK_FLOW",
        }
    }
}

/// The process execution that triggered a runtime policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSignal {
    pub name: String,
    pub exec_file_path: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIndicator {
    #[serde(default)]
    pub container_name: String,
    pub signal: ProcessSignal,
}

impl ProcessIndicator {
    /// Indicator for `name` executed from `/usr/bin/<name>` at `time`.
    pub fn new(name: impl Into<String>, time: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            container_name: String::new(),
            signal: ProcessSignal {
                exec_file_path: format!("/usr/bin/{name}"),
                name,
                args: String::new(),
                uid: 0,
                time: Some(time),
            },
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.signal.args = args.into();
        self
    }
}

/// Process evidence plus its rendered summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessViolation {
    pub message: String,
    pub processes: Vec<ProcessIndicator>,
}

impl ProcessViolation {
    /// Builds a process violation with its message already rendered.
    pub fn new(processes: Vec<ProcessIndicator>) -> Self {
        let mut violation = Self {
            message: String::new(),
            processes,
        };
        crate::printer::update_process_violation_message(&mut violation);
        violation
    }
}

/// Persisted record of a policy violation against a specific entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Empty until the alert has been assigned an identity for persistence.
    #[serde(default)]
    pub id: String,
    pub policy: PolicyRef,
    pub entity: Entity,
    pub lifecycle_stage: LifecycleStage,
    pub state: ViolationState,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_violation: Option<ProcessViolation>,
    /// First time the finding was observed.
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// A fresh, unpersisted ACTIVE alert observed now.
    pub fn new(policy: PolicyRef, entity: Entity, lifecycle_stage: LifecycleStage) -> Self {
        Self {
            id: String::new(),
            policy,
            entity,
            lifecycle_stage,
            state: ViolationState::Active,
            violations: Vec::new(),
            process_violation: None,
            time: Utc::now(),
            resolved_at: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: ViolationState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_violations(mut self, violations: impl IntoIterator<Item = Violation>) -> Self {
        self.violations.extend(violations);
        self
    }

    #[must_use]
    pub fn with_processes(mut self, processes: impl IntoIterator<Item = ProcessIndicator>) -> Self {
        self.process_violation = Some(ProcessViolation::new(processes.into_iter().collect()));
        self
    }

    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.policy.id, &self.entity.id)
    }

    #[must_use]
    pub fn is_runtime(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Runtime
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Process indicators attached to this alert, if any.
    #[must_use]
    pub fn processes(&self) -> &[ProcessIndicator] {
        self.process_violation
            .as_ref()
            .map_or(&[], |pv| pv.processes.as_slice())
    }

    /// Total pieces of evidence carried by the alert.
    #[must_use]
    pub fn evidence_count(&self) -> usize {
        self.violations.len() + self.processes().len()
    }

    /// Transitions the alert to RESOLVED, stamping `resolved_at`.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.state = ViolationState::Resolved;
        self.resolved_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_alert() -> Alert {
        Alert::new(
            PolicyRef::new("policy1", "Latest tag", Severity::Low),
            Entity::deployment("dep1", "nginx").in_namespace("default"),
            LifecycleStage::Runtime,
        )
    }

    #[test]
    fn test_dedup_key_is_policy_and_entity() {
        let alert = sample_alert();
        assert_eq!(alert.dedup_key(), DedupKey::new("policy1", "dep1"));
        assert_eq!(alert.dedup_key().to_string(), "policy1/dep1");
    }

    #[test]
    fn test_new_alert_is_active_and_unpersisted() {
        let alert = sample_alert();
        assert_eq!(alert.state, ViolationState::Active);
        assert!(!alert.is_persisted());
        assert!(alert.resolved_at.is_none());
        assert!(alert.processes().is_empty());
    }

    #[test]
    fn test_resolve_sets_state_and_timestamp_together() {
        let mut alert = sample_alert().with_id("a1");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        alert.resolve(at);
        assert_eq!(alert.state, ViolationState::Resolved);
        assert_eq!(alert.resolved_at, Some(at));
    }

    #[test]
    fn test_network_flow_timestamp_attribute() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 5).unwrap();
        let violation = Violation::network_flow("flow", at);
        assert_eq!(violation.kind_name(), "NETWORK_FLOW");
        match violation.kind {
            ViolationKind::NetworkFlow { attributes } => {
                assert_eq!(attributes[0].key, NETWORK_FLOW_TIMESTAMP_KEY);
                assert_eq!(attributes[0].value, "2024-05-01 08:30:05 UTC");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_violation_serializes_with_type_tag() {
        let violation = Violation::generic("privileged container");
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains("\"type\":\"GENERIC\""));
        assert!(json.contains("\"message\":\"privileged container\""));
    }

    #[test]
    fn test_evidence_count_includes_processes() {
        let now = Utc::now();
        let alert = sample_alert()
            .with_processes([ProcessIndicator::new("apt-get", now)])
            .with_violations([Violation::generic("one"), Violation::generic("two")]);
        assert_eq!(alert.evidence_count(), 3);
    }
}
