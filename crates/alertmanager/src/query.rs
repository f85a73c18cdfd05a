//! Scoped alert queries.
//!
//! A reconciliation pass covers a scope (one policy, one deployment, or every
//! active alert the caller may see). [`ScopeFilter`]s narrow that scope and
//! compile into an [`AlertQuery`] the store understands.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Alert, DedupKey, LifecycleStage, ViolationState};

/// Narrows the set of previous alerts a reconciliation pass covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "value", rename_all = "snake_case")]
pub enum ScopeFilter {
    Policy(String),
    Entity(String),
    LifecycleStage(LifecycleStage),
    ExcludeLifecycleStage(LifecycleStage),
}

impl ScopeFilter {
    pub fn policy(id: impl Into<String>) -> Self {
        Self::Policy(id.into())
    }

    pub fn entity(id: impl Into<String>) -> Self {
        Self::Entity(id.into())
    }
}

/// Conjunction of field constraints over alerts. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertQuery {
    pub states: Vec<ViolationState>,
    pub policy_id: Option<String>,
    pub entity_id: Option<String>,
    pub stages: Vec<LifecycleStage>,
    pub excluded_stages: Vec<LifecycleStage>,
}

impl AlertQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ACTIVE alert, before any scope filters are applied.
    #[must_use]
    pub fn active() -> Self {
        Self::new().with_state(ViolationState::Active)
    }

    /// RESOLVED alerts sharing `key`'s policy and entity.
    #[must_use]
    pub fn resolved_for(key: &DedupKey) -> Self {
        Self::new()
            .with_state(ViolationState::Resolved)
            .with_policy_id(&key.policy_id)
            .with_entity_id(&key.entity_id)
    }

    #[must_use]
    pub fn with_state(mut self, state: ViolationState) -> Self {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    #[must_use]
    pub fn with_policy_id(mut self, id: impl Into<String>) -> Self {
        self.policy_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_stage(mut self, stage: LifecycleStage) -> Self {
        if !self.stages.contains(&stage) {
            self.stages.push(stage);
        }
        self
    }

    #[must_use]
    pub fn without_stage(mut self, stage: LifecycleStage) -> Self {
        if !self.excluded_stages.contains(&stage) {
            self.excluded_stages.push(stage);
        }
        self
    }

    /// Applies one filter. A later policy or entity filter replaces an earlier one.
    #[must_use]
    pub fn with_filter(self, filter: &ScopeFilter) -> Self {
        match filter {
            ScopeFilter::Policy(id) => self.with_policy_id(id),
            ScopeFilter::Entity(id) => self.with_entity_id(id),
            ScopeFilter::LifecycleStage(stage) => self.with_stage(*stage),
            ScopeFilter::ExcludeLifecycleStage(stage) => self.without_stage(*stage),
        }
    }

    #[must_use]
    pub fn with_filters(self, filters: &[ScopeFilter]) -> Self {
        filters.iter().fold(self, Self::with_filter)
    }

    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        (self.states.is_empty() || self.states.contains(&alert.state))
            && self
                .policy_id
                .as_ref()
                .is_none_or(|id| *id == alert.policy.id)
            && self
                .entity_id
                .as_ref()
                .is_none_or(|id| *id == alert.entity.id)
            && (self.stages.is_empty() || self.stages.contains(&alert.lifecycle_stage))
            && !self.excluded_stages.contains(&alert.lifecycle_stage)
    }
}

/// Renders as `Violation State:ACTIVE+Policy ID:p1`, for logs.
impl fmt::Display for AlertQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::new();
        if !self.states.is_empty() {
            let states: Vec<&str> = self.states.iter().map(ViolationState::as_str).collect();
            terms.push(format!("Violation State:{}", states.join(",")));
        }
        if let Some(id) = &self.policy_id {
            terms.push(format!("Policy ID:{id}"));
        }
        if let Some(id) = &self.entity_id {
            terms.push(format!("Entity ID:{id}"));
        }
        if !self.stages.is_empty() {
            let stages: Vec<&str> = self.stages.iter().map(LifecycleStage::as_str).collect();
            terms.push(format!("Lifecycle Stage:{}", stages.join(",")));
        }
        for stage in &self.excluded_stages {
            terms.push(format!("Lifecycle Stage:!{stage}"));
        }
        if terms.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&terms.join("+"))
        }
    }
}
