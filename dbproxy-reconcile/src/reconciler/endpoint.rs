//! Endpoint family - reconciles additional proxy endpoints.

use async_trait::async_trait;

use super::poll::{StatusSets, PROXY_STATUSES};
use super::proxy::same_set;
use super::{Action, ResourceFamily};
use crate::clients::ControlPlane;
use crate::error::Result;
use crate::model::{EndpointModel, EndpointSnapshot, Tag};
use crate::token::Step;

const CREATE: &[Step] = &[Step::MutatePrimary, Step::Stabilize];
const UPDATE: &[Step] = &[
    Step::ValidateImmutable,
    Step::MutatePrimary,
    Step::RemoveTags,
    Step::AddTags,
    Step::Stabilize,
];
const DELETE: &[Step] = &[Step::DeletePrimary, Step::ConfirmDeleted];

/// Additional endpoints of a database proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointFamily;

#[async_trait]
impl ResourceFamily for EndpointFamily {
    type Model = EndpointModel;
    type Snapshot = EndpointSnapshot;

    const KIND: &'static str = "DB proxy endpoint";

    fn plan(&self, action: Action) -> &'static [Step] {
        match action {
            Action::Create => CREATE,
            Action::Update => UPDATE,
            Action::Delete => DELETE,
        }
    }

    fn identifier(&self, model: &EndpointModel) -> String {
        model.db_proxy_endpoint_name.clone()
    }

    /// Fields left empty in `desired` are not compared.
    fn create_only_violation(
        &self,
        previous: &EndpointModel,
        desired: &EndpointModel,
    ) -> Option<String> {
        if !desired.db_proxy_name.is_empty() && previous.db_proxy_name != desired.db_proxy_name {
            return Some("db_proxy_name".to_string());
        }
        if !desired.db_proxy_endpoint_name.is_empty()
            && previous.db_proxy_endpoint_name != desired.db_proxy_endpoint_name
        {
            return Some("db_proxy_endpoint_name".to_string());
        }
        if !desired.vpc_subnet_ids.is_empty()
            && !same_set(&previous.vpc_subnet_ids, &desired.vpc_subnet_ids)
        {
            return Some("vpc_subnet_ids".to_string());
        }
        if desired.target_role.is_some() && previous.target_role != desired.target_role {
            return Some("target_role".to_string());
        }
        None
    }

    async fn create(
        &self,
        cp: &dyn ControlPlane,
        desired: &EndpointModel,
    ) -> Result<Option<EndpointSnapshot>> {
        cp.create_proxy_endpoint(desired).await
    }

    async fn modify(
        &self,
        cp: &dyn ControlPlane,
        _previous: &EndpointModel,
        desired: &EndpointModel,
    ) -> Result<Option<EndpointSnapshot>> {
        cp.modify_proxy_endpoint(&desired.db_proxy_endpoint_name, &desired.vpc_security_group_ids)
            .await
    }

    async fn delete(
        &self,
        cp: &dyn ControlPlane,
        model: &EndpointModel,
    ) -> Result<Option<EndpointSnapshot>> {
        cp.delete_proxy_endpoint(&model.db_proxy_endpoint_name).await
    }

    async fn describe(&self, cp: &dyn ControlPlane, model: &EndpointModel) -> Result<EndpointSnapshot> {
        cp.describe_proxy_endpoint(&model.db_proxy_endpoint_name).await
    }

    fn status<'a>(&self, snapshot: &'a EndpointSnapshot) -> &'a str {
        &snapshot.status
    }

    fn status_sets(&self) -> StatusSets {
        PROXY_STATUSES
    }

    fn arn<'a>(&self, snapshot: &'a EndpointSnapshot) -> Option<&'a str> {
        snapshot.db_proxy_endpoint_arn.as_deref()
    }

    fn output(
        &self,
        desired: &EndpointModel,
        _previous: Option<&EndpointModel>,
        observed: Option<&EndpointSnapshot>,
    ) -> EndpointModel {
        let mut model = desired.clone();
        if let Some(snapshot) = observed {
            model.db_proxy_endpoint_arn = snapshot.db_proxy_endpoint_arn.clone();
            model.endpoint = snapshot.endpoint.clone();
            model.vpc_id = snapshot.vpc_id.clone();
            model.is_default = Some(snapshot.is_default);
            if model.target_role.is_none() {
                model.target_role = snapshot.target_role.clone();
            }
        }
        model
    }

    fn tags<'a>(&self, model: &'a EndpointModel) -> &'a [Tag] {
        &model.tags
    }
}
