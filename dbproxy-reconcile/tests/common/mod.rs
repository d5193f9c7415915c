//! Shared helpers for the reconciler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use dbproxy_reconcile::clients::{ControlPlane, MemoryControlPlane};
use dbproxy_reconcile::reconciler::{Outcome, Token};
use dbproxy_reconcile::{Action, ReconcileRequest, Reconciler, ReconcilerConfig, ResourceFamily};

/// Upper bound on invocations before a test run is considered stuck.
const MAX_INVOCATIONS: usize = 100;

/// Short polls and a small budget so timeouts are reachable.
pub fn config(max_retries: u32) -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval_ms: 10,
        max_stabilization_retries: max_retries,
    }
}

pub fn reconciler<F: ResourceFamily>(
    family: F,
    cp: &Arc<MemoryControlPlane>,
    config: ReconcilerConfig,
) -> Reconciler<F> {
    let cp: Arc<dyn ControlPlane> = cp.clone();
    Reconciler::new(family, cp, config)
}

/// One invocation.
pub async fn invoke<F: ResourceFamily>(
    reconciler: &Reconciler<F>,
    action: Action,
    desired: &F::Model,
    previous: Option<&F::Model>,
    token: Option<Token<F>>,
) -> Outcome<F> {
    reconciler
        .reconcile(ReconcileRequest {
            action,
            desired: desired.clone(),
            previous: previous.cloned(),
            token,
        })
        .await
}

/// Invoke until the run leaves IN_PROGRESS. Returns the final result and the
/// number of invocations it took.
pub async fn run<F: ResourceFamily>(
    reconciler: &Reconciler<F>,
    action: Action,
    desired: &F::Model,
    previous: Option<&F::Model>,
) -> (Outcome<F>, usize) {
    let mut token = None;
    for invocation in 1..=MAX_INVOCATIONS {
        let result = invoke(reconciler, action, desired, previous, token).await;
        if !result.is_in_progress() {
            return (result, invocation);
        }
        token = result.token;
    }
    panic!("run did not finish within {} invocations", MAX_INVOCATIONS);
}
