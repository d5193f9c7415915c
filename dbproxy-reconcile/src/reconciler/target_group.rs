//! Target group family - reconciles a proxy's target group and the databases
//! registered behind it.
//!
//! Target groups are never created or deleted on their own: every proxy owns
//! a default group. "Create" waits for the proxy, applies the pool settings
//! and registers the declared targets; "delete" deregisters everything.

use async_trait::async_trait;

use super::poll::{StatusSets, PROXY_STATUSES};
use super::{Action, ResourceFamily};
use crate::clients::ControlPlane;
use crate::error::Result;
use crate::model::{RegisteredTarget, Target, TargetGroupModel, TargetGroupSnapshot};
use crate::token::Step;

const CREATE: &[Step] = &[
    Step::AwaitParent,
    Step::MutatePrimary,
    Step::AddTargets,
    Step::HealthGate,
];
const UPDATE: &[Step] = &[
    Step::ValidateImmutable,
    Step::MutatePrimary,
    Step::RemoveTargets,
    Step::AddTargets,
    Step::HealthGate,
];
const DELETE: &[Step] = &[Step::DeregisterDependents];

/// Proxy target groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetGroupFamily;

impl TargetGroupFamily {
    /// Apply the pool settings, or just look the group up when there are none.
    async fn configure(
        &self,
        cp: &dyn ControlPlane,
        desired: &TargetGroupModel,
    ) -> Result<Option<TargetGroupSnapshot>> {
        let snapshot = match &desired.connection_pool_configuration_info {
            Some(config) => {
                cp.modify_target_group(&desired.db_proxy_name, desired.group_name(), config)
                    .await?
            }
            None => {
                cp.describe_target_group(&desired.db_proxy_name, desired.group_name())
                    .await?
            }
        };
        Ok(Some(snapshot))
    }
}

/// Equal in everything but the read-only ARN.
fn unchanged(previous: &TargetGroupModel, desired: &TargetGroupModel) -> bool {
    let previous = TargetGroupModel {
        target_group_arn: None,
        ..previous.clone()
    };
    let desired = TargetGroupModel {
        target_group_arn: None,
        ..desired.clone()
    };
    previous == desired
}

#[async_trait]
impl ResourceFamily for TargetGroupFamily {
    type Model = TargetGroupModel;
    type Snapshot = TargetGroupSnapshot;

    const KIND: &'static str = "target group";

    fn plan(&self, action: Action) -> &'static [Step] {
        match action {
            Action::Create => CREATE,
            Action::Update => UPDATE,
            Action::Delete => DELETE,
        }
    }

    fn identifier(&self, model: &TargetGroupModel) -> String {
        format!("{}/{}", model.db_proxy_name, model.group_name())
    }

    fn create_only_violation(
        &self,
        previous: &TargetGroupModel,
        desired: &TargetGroupModel,
    ) -> Option<String> {
        if previous.db_proxy_name != desired.db_proxy_name {
            return Some("db_proxy_name".to_string());
        }
        if previous.group_name() != desired.group_name() {
            return Some("target_group_name".to_string());
        }
        None
    }

    async fn create(
        &self,
        cp: &dyn ControlPlane,
        desired: &TargetGroupModel,
    ) -> Result<Option<TargetGroupSnapshot>> {
        self.configure(cp, desired).await
    }

    async fn modify(
        &self,
        cp: &dyn ControlPlane,
        previous: &TargetGroupModel,
        desired: &TargetGroupModel,
    ) -> Result<Option<TargetGroupSnapshot>> {
        if unchanged(previous, desired) {
            return Ok(None);
        }
        self.configure(cp, desired).await
    }

    /// Groups go away with their proxy; nothing to delete here.
    async fn delete(
        &self,
        _cp: &dyn ControlPlane,
        _model: &TargetGroupModel,
    ) -> Result<Option<TargetGroupSnapshot>> {
        Ok(None)
    }

    async fn describe(
        &self,
        cp: &dyn ControlPlane,
        model: &TargetGroupModel,
    ) -> Result<TargetGroupSnapshot> {
        cp.describe_target_group(&model.db_proxy_name, model.group_name())
            .await
    }

    fn status<'a>(&self, snapshot: &'a TargetGroupSnapshot) -> &'a str {
        &snapshot.status
    }

    /// Readiness is judged on the owning proxy.
    fn status_sets(&self) -> StatusSets {
        PROXY_STATUSES
    }

    fn arn<'a>(&self, snapshot: &'a TargetGroupSnapshot) -> Option<&'a str> {
        snapshot.target_group_arn.as_deref()
    }

    /// An unchanged update observes nothing, so the ARN falls back to the
    /// previous model.
    fn output(
        &self,
        desired: &TargetGroupModel,
        previous: Option<&TargetGroupModel>,
        observed: Option<&TargetGroupSnapshot>,
    ) -> TargetGroupModel {
        let mut model = desired.clone();
        model.target_group_arn = observed
            .and_then(|snapshot| snapshot.target_group_arn.clone())
            .or_else(|| desired.target_group_arn.clone())
            .or_else(|| previous.and_then(|p| p.target_group_arn.clone()));
        model
    }

    async fn describe_parent(&self, cp: &dyn ControlPlane, model: &TargetGroupModel) -> Result<String> {
        let proxy = cp.describe_proxy(&model.db_proxy_name).await?;
        Ok(proxy.status)
    }

    fn targets(&self, model: &TargetGroupModel) -> Vec<Target> {
        model.targets()
    }

    async fn register_targets(
        &self,
        cp: &dyn ControlPlane,
        model: &TargetGroupModel,
        targets: &[Target],
    ) -> Result<Vec<RegisteredTarget>> {
        cp.register_targets(&model.db_proxy_name, model.group_name(), targets)
            .await
    }

    async fn deregister_targets(
        &self,
        cp: &dyn ControlPlane,
        model: &TargetGroupModel,
        targets: &[Target],
    ) -> Result<()> {
        cp.deregister_targets(&model.db_proxy_name, model.group_name(), targets)
            .await
    }

    async fn describe_targets(
        &self,
        cp: &dyn ControlPlane,
        model: &TargetGroupModel,
    ) -> Result<Vec<RegisteredTarget>> {
        cp.describe_targets(&model.db_proxy_name, model.group_name())
            .await
    }
}
