//! Target group reconciliation against the in-memory control plane.

mod common;

use std::sync::Arc;
use std::time::Duration;

use dbproxy_reconcile::clients::memory::Operation;
use dbproxy_reconcile::clients::MemoryControlPlane;
use dbproxy_reconcile::model::{ConnectionPoolConfig, TargetGroupModel};
use dbproxy_reconcile::reconciler::TargetGroupFamily;
use dbproxy_reconcile::{Action, ControlPlaneError, ErrorCode, OperationStatus, Step};

fn group(clusters: &[&str], instances: &[&str]) -> TargetGroupModel {
    TargetGroupModel {
        db_proxy_name: "orders".to_string(),
        db_cluster_identifiers: clusters.iter().map(|s| s.to_string()).collect(),
        db_instance_identifiers: instances.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// Control plane with the proxy and its (empty) default group.
fn setup() -> Arc<MemoryControlPlane> {
    let cp = Arc::new(MemoryControlPlane::new(0));
    cp.seed_target_group(&group(&[], &[]));
    cp
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_waits_for_proxy_then_registers_targets() {
    let cp = setup();
    cp.script_proxy("orders", &["creating", "available"]);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = group(&[], &["db-1"]);

    let first = common::invoke(&reconciler, Action::Create, &desired, None, None).await;
    assert!(first.is_in_progress());
    assert_eq!(first.reinvoke_delay, Duration::from_millis(10));
    let token = first.token.unwrap();
    assert!(!token.is_complete(Step::AwaitParent));
    assert_eq!(token.retries_remaining(), 4);
    assert_eq!(cp.count(Operation::RegisterTargets), 0);

    let second = common::invoke(&reconciler, Action::Create, &desired, None, Some(token)).await;
    let token = second.token.unwrap();
    assert!(token.is_complete(Step::AwaitParent));
    assert_eq!(token.retries_remaining(), 5);

    let (result, invocations) = {
        let mut token = Some(token);
        let mut invocations = 2;
        loop {
            invocations += 1;
            let result = common::invoke(&reconciler, Action::Create, &desired, None, token).await;
            if !result.is_in_progress() {
                break (result, invocations);
            }
            token = result.token;
        }
    };
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(invocations, 5);
    assert!(result.model.unwrap().target_group_arn.is_some());
    assert_eq!(cp.registered_ids("orders", "default"), vec!["db-1".to_string()]);
    assert_eq!(cp.count(Operation::ModifyTargetGroup), 0);
    assert_eq!(cp.count(Operation::DescribeTargetGroup), 1);
}

#[tokio::test]
async fn test_create_applies_connection_pool_settings() {
    let cp = setup();
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = TargetGroupModel {
        connection_pool_configuration_info: Some(ConnectionPoolConfig {
            max_connections_percent: Some(90),
            ..Default::default()
        }),
        ..group(&["orders-cluster"], &[])
    };

    let (result, _) = common::run(&reconciler, Action::Create, &desired, None).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(cp.count(Operation::ModifyTargetGroup), 1);
    assert_eq!(cp.count(Operation::DescribeTargetGroup), 0);
}

#[tokio::test]
async fn test_unhealthy_instance_keeps_run_in_progress() {
    let cp = setup();
    cp.script_target_health("db-1", &[Some("UNAVAILABLE"), Some("AVAILABLE")]);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = group(&[], &["db-1"]);

    let mut token = None;
    for _ in 0..3 {
        token = common::invoke(&reconciler, Action::Create, &desired, None, token)
            .await
            .token;
    }
    let gate = common::invoke(&reconciler, Action::Create, &desired, None, token).await;
    assert_eq!(gate.status, OperationStatus::InProgress);
    assert_eq!(gate.reinvoke_delay, Duration::from_millis(10));
    let token = gate.token.unwrap();
    assert_eq!(token.retries_remaining(), 4);
    let dependents = token.dependents().unwrap();
    assert_eq!(dependents[0].health.as_ref().unwrap().state, "UNAVAILABLE");

    let done = common::invoke(&reconciler, Action::Create, &desired, None, Some(token)).await;
    assert_eq!(done.status, OperationStatus::Success);
}

#[tokio::test]
async fn test_cluster_without_health_passes_the_gate() {
    let cp = setup();
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = group(&["orders-cluster"], &[]);

    let (result, invocations) = common::run(&reconciler, Action::Create, &desired, None).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(invocations, 4);
}

#[tokio::test]
async fn test_never_healthy_target_times_out() {
    let cp = setup();
    cp.script_target_health("db-1", &[Some("UNAVAILABLE")]);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(2));
    let desired = group(&[], &["db-1"]);

    let (result, _) = common::run(&reconciler, Action::Create, &desired, None).await;
    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    assert_eq!(cp.count(Operation::DescribeTargets), 2);
}

#[tokio::test]
async fn test_failed_proxy_fails_as_not_found() {
    let cp = setup();
    cp.script_proxy("orders", &["insufficient-resource-limits"]);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let result = common::invoke(&reconciler, Action::Create, &group(&[], &["db-1"]), None, None).await;
    assert_eq!(result.error_code, Some(ErrorCode::NotFound));
    assert_eq!(cp.count(Operation::RegisterTargets), 0);
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_swaps_changed_targets() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let previous = group(&[], &["db-1", "db-2"]);
    cp.seed_target_group(&previous);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = group(&[], &["db-2", "db-3"]);

    let (result, invocations) =
        common::run(&reconciler, Action::Update, &desired, Some(&previous)).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(invocations, 4);

    let deregistered = cp.calls_to(Operation::DeregisterTargets);
    assert_eq!(deregistered.len(), 1);
    assert_eq!(deregistered[0].items, vec!["db-1".to_string()]);
    let registered = cp.calls_to(Operation::RegisterTargets);
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].items, vec!["db-3".to_string()]);
    assert_eq!(
        cp.registered_ids("orders", "default"),
        vec!["db-2".to_string(), "db-3".to_string()]
    );
}

#[tokio::test]
async fn test_unchanged_update_only_checks_health() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let model = group(&[], &["db-1"]);
    cp.seed_target_group(&model);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let (result, invocations) = common::run(&reconciler, Action::Update, &model, Some(&model)).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(invocations, 2);
    assert_eq!(cp.count(Operation::DescribeTargetGroup), 0);
    assert_eq!(cp.count(Operation::RegisterTargets), 0);
    assert_eq!(cp.count(Operation::DeregisterTargets), 0);
}

#[tokio::test]
async fn test_unchanged_update_keeps_the_previous_arn() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let desired = group(&[], &["db-1"]);
    let arn = cp.seed_target_group(&desired).target_group_arn.unwrap();
    let previous = TargetGroupModel {
        target_group_arn: Some(arn.clone()),
        ..desired.clone()
    };
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let (result, _) = common::run(&reconciler, Action::Update, &desired, Some(&previous)).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.model.unwrap().target_group_arn, Some(arn));
    assert_eq!(cp.count(Operation::DescribeTargetGroup), 0);
    assert_eq!(cp.count(Operation::ModifyTargetGroup), 0);
}

#[tokio::test]
async fn test_replayed_tokens_do_not_repeat_target_writes() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let previous = group(&[], &["db-1"]);
    cp.seed_target_group(&previous);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let desired = group(&[], &["db-2"]);

    let mut token = None;
    for _ in 0..3 {
        token = common::invoke(&reconciler, Action::Update, &desired, Some(&previous), token)
            .await
            .token;
    }
    let token = token.unwrap();
    assert!(token.is_complete(Step::RemoveTargets));
    assert!(token.is_complete(Step::AddTargets));

    for _ in 0..2 {
        let replay = common::invoke(
            &reconciler,
            Action::Update,
            &desired,
            Some(&previous),
            Some(token.clone()),
        )
        .await;
        assert_eq!(replay.status, OperationStatus::Success);
    }
    assert_eq!(cp.count(Operation::DeregisterTargets), 1);
    assert_eq!(cp.count(Operation::RegisterTargets), 1);
    assert_eq!(cp.registered_ids("orders", "default"), vec!["db-2".to_string()]);
}

#[tokio::test]
async fn test_renaming_group_is_rejected() {
    let cp = setup();
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let previous = group(&[], &[]);
    let desired = TargetGroupModel {
        target_group_name: "replicas".to_string(),
        ..group(&[], &[])
    };

    let result = common::invoke(&reconciler, Action::Update, &desired, Some(&previous), None).await;
    assert_eq!(result.error_code, Some(ErrorCode::NotUpdatable));
}

#[tokio::test]
async fn test_update_of_missing_group_fails_as_not_found() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));
    let previous = group(&[], &["db-1"]);
    let desired = group(&[], &["db-2"]);

    let result = common::invoke(&reconciler, Action::Update, &desired, Some(&previous), None).await;
    assert_eq!(result.error_code, Some(ErrorCode::NotFound));
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_deregisters_everything_in_one_invocation() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let model = group(&["orders-cluster"], &["db-1"]);
    cp.seed_target_group(&model);
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let result = common::invoke(&reconciler, Action::Delete, &group(&[], &[]), None, None).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert!(result.model.is_none());
    assert!(cp.registered_ids("orders", "default").is_empty());

    let deregistered = cp.calls_to(Operation::DeregisterTargets);
    assert_eq!(deregistered.len(), 1);
    assert_eq!(
        deregistered[0].items,
        vec!["db-1".to_string(), "orders-cluster".to_string()]
    );
}

#[tokio::test]
async fn test_delete_with_missing_proxy_succeeds() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let result = common::invoke(&reconciler, Action::Delete, &group(&[], &["db-1"]), None, None).await;
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(cp.count(Operation::DeregisterTargets), 0);
}

#[tokio::test]
async fn test_delete_tolerates_proxy_in_invalid_state() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    cp.seed_target_group(&group(&[], &["db-1"]));
    cp.fail_next(
        Operation::DeregisterTargets,
        ControlPlaneError::InvalidState("DB proxy orders is being deleted".to_string()),
    );
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let result = common::invoke(&reconciler, Action::Delete, &group(&[], &["db-1"]), None, None).await;
    assert_eq!(result.status, OperationStatus::Success);
}

#[tokio::test]
async fn test_delete_propagates_service_errors() {
    let cp = Arc::new(MemoryControlPlane::new(0));
    cp.seed_target_group(&group(&[], &["db-1"]));
    cp.fail_next(
        Operation::DescribeTargets,
        ControlPlaneError::Service("Internal failure".to_string()),
    );
    let reconciler = common::reconciler(TargetGroupFamily, &cp, common::config(5));

    let result = common::invoke(&reconciler, Action::Delete, &group(&[], &["db-1"]), None, None).await;
    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.error_code, Some(ErrorCode::ServiceInternalError));
    assert_eq!(result.message.as_deref(), Some("Internal failure"));
}
