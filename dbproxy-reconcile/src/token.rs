//! Progress token threaded between invocations of a run.
//!
//! The token is the only state that survives between two invocations. Every
//! transition consumes the token and returns the next generation; completed
//! steps can be added but never removed.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::model::RegisteredTarget;

/// Named unit of work in a reconciliation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Create-only fields must match between previous and desired state.
    ValidateImmutable,
    /// Wait for the owning proxy to become available.
    AwaitParent,
    /// Create or modify the managed resource.
    MutatePrimary,
    RemoveTags,
    AddTags,
    /// Wait for the managed resource to reach a terminal status.
    Stabilize,
    RemoveTargets,
    AddTargets,
    /// All registered targets report healthy.
    HealthGate,
    /// Deregister every target before the group goes away.
    DeregisterDependents,
    DeletePrimary,
    /// Wait for the managed resource to disappear.
    ConfirmDeleted,
}

/// Serializable progress of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressToken<S> {
    observed: Option<S>,
    #[serde(default)]
    dependents: Option<Vec<RegisteredTarget>>,
    #[serde(default)]
    completed: BTreeSet<Step>,
    retries_remaining: u32,
}

impl<S> ProgressToken<S> {
    /// Token for the first invocation of a run.
    pub fn fresh(retry_budget: u32) -> Self {
        Self {
            observed: None,
            dependents: None,
            completed: BTreeSet::new(),
            retries_remaining: retry_budget,
        }
    }

    /// Last observed snapshot of the managed resource.
    pub fn observed(&self) -> Option<&S> {
        self.observed.as_ref()
    }

    /// Last observed registered targets (target groups only).
    pub fn dependents(&self) -> Option<&[RegisteredTarget]> {
        self.dependents.as_deref()
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    pub fn is_complete(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = Step> + '_ {
        self.completed.iter().copied()
    }

    /// Mark `step` done and grant a fresh retry budget for the next phase.
    pub(crate) fn complete(mut self, step: Step, retry_budget: u32) -> Self {
        self.completed.insert(step);
        self.retries_remaining = retry_budget;
        self
    }

    /// Mark `step` done without touching the retry budget.
    pub(crate) fn mark(mut self, step: Step) -> Self {
        self.completed.insert(step);
        self
    }

    /// Replace the observed snapshot.
    pub(crate) fn observe(mut self, snapshot: Option<S>) -> Self {
        self.observed = snapshot;
        self
    }

    pub(crate) fn observe_targets(mut self, targets: Vec<RegisteredTarget>) -> Self {
        self.dependents = Some(targets);
        self
    }

    /// Consume one unit of retry budget for a waiting invocation.
    pub(crate) fn waited(mut self) -> Self {
        self.retries_remaining = self.retries_remaining.saturating_sub(1);
        self
    }
}

impl<S: Serialize> ProgressToken<S> {
    /// Opaque form handed to the scheduler.
    pub fn encode(&self) -> Result<String, TokenError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<S: DeserializeOwned> ProgressToken<S> {
    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        Ok(serde_json::from_str(encoded)?)
    }
}
