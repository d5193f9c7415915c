//! Proxy family - reconciles database proxies.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::poll::{StatusSets, PROXY_STATUSES};
use super::{Action, ResourceFamily};
use crate::clients::ControlPlane;
use crate::error::Result;
use crate::model::{ProxyModel, ProxySnapshot, Tag};
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

/// Database proxies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFamily;

#[async_trait]
impl ResourceFamily for ProxyFamily {
    type Model = ProxyModel;
    type Snapshot = ProxySnapshot;

    const KIND: &'static str = "DB proxy";

    fn plan(&self, action: Action) -> &'static [Step] {
        match action {
            Action::Create => CREATE,
            Action::Update => UPDATE,
            Action::Delete => DELETE,
        }
    }

    fn identifier(&self, model: &ProxyModel) -> String {
        model.db_proxy_name.clone()
    }

    fn create_only_violation(&self, previous: &ProxyModel, desired: &ProxyModel) -> Option<String> {
        if previous.db_proxy_name != desired.db_proxy_name {
            return Some("db_proxy_name".to_string());
        }
        if !desired.engine_family.is_empty() && previous.engine_family != desired.engine_family {
            return Some("engine_family".to_string());
        }
        if !desired.vpc_subnet_ids.is_empty()
            && !same_set(&previous.vpc_subnet_ids, &desired.vpc_subnet_ids)
        {
            return Some("vpc_subnet_ids".to_string());
        }
        None
    }

    async fn create(
        &self,
        cp: &dyn ControlPlane,
        desired: &ProxyModel,
    ) -> Result<Option<ProxySnapshot>> {
        cp.create_proxy(desired).await
    }

    async fn modify(
        &self,
        cp: &dyn ControlPlane,
        _previous: &ProxyModel,
        desired: &ProxyModel,
    ) -> Result<Option<ProxySnapshot>> {
        cp.modify_proxy(&desired.db_proxy_name, desired).await
    }

    async fn delete(&self, cp: &dyn ControlPlane, model: &ProxyModel) -> Result<Option<ProxySnapshot>> {
        cp.delete_proxy(&model.db_proxy_name).await
    }

    async fn describe(&self, cp: &dyn ControlPlane, model: &ProxyModel) -> Result<ProxySnapshot> {
        cp.describe_proxy(&model.db_proxy_name).await
    }

    fn status<'a>(&self, snapshot: &'a ProxySnapshot) -> &'a str {
        &snapshot.status
    }

    fn status_sets(&self) -> StatusSets {
        PROXY_STATUSES
    }

    fn arn<'a>(&self, snapshot: &'a ProxySnapshot) -> Option<&'a str> {
        snapshot.db_proxy_arn.as_deref()
    }

    fn output(
        &self,
        desired: &ProxyModel,
        _previous: Option<&ProxyModel>,
        observed: Option<&ProxySnapshot>,
    ) -> ProxyModel {
        let mut model = desired.clone();
        if let Some(snapshot) = observed {
            model.db_proxy_arn = snapshot.db_proxy_arn.clone();
            model.endpoint = snapshot.endpoint.clone();
            model.vpc_id = snapshot.vpc_id.clone();
        }
        model
    }

    fn tags<'a>(&self, model: &'a ProxyModel) -> &'a [Tag] {
        &model.tags
    }
}

/// Order-insensitive comparison of identifier lists.
pub(crate) fn same_set(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ProxyModel {
        ProxyModel {
            db_proxy_name: "orders".to_string(),
            engine_family: "POSTGRESQL".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/proxy".to_string(),
            vpc_subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn mutable_fields_may_change() {
        let previous = model();
        let desired = ProxyModel {
            role_arn: "arn:aws:iam::123456789012:role/other".to_string(),
            require_tls: Some(true),
            tags: vec![Tag::new("env", "prod")],
            ..model()
        };
        assert_eq!(ProxyFamily.create_only_violation(&previous, &desired), None);
    }

    #[test]
    fn subnet_order_is_ignored() {
        let desired = ProxyModel {
            vpc_subnet_ids: vec!["subnet-b".to_string(), "subnet-a".to_string()],
            ..model()
        };
        assert_eq!(ProxyFamily.create_only_violation(&model(), &desired), None);
    }

    #[test]
    fn create_only_fields_are_rejected() {
        let renamed = ProxyModel {
            db_proxy_name: "billing".to_string(),
            ..model()
        };
        let engine = ProxyModel {
            engine_family: "MYSQL".to_string(),
            ..model()
        };
        let subnets = ProxyModel {
            vpc_subnet_ids: vec!["subnet-c".to_string()],
            ..model()
        };
        assert_eq!(
            ProxyFamily.create_only_violation(&model(), &renamed).as_deref(),
            Some("db_proxy_name")
        );
        assert_eq!(
            ProxyFamily.create_only_violation(&model(), &engine).as_deref(),
            Some("engine_family")
        );
        assert_eq!(
            ProxyFamily.create_only_violation(&model(), &subnets).as_deref(),
            Some("vpc_subnet_ids")
        );
    }

    #[test]
    fn output_fills_read_only_fields() {
        let snapshot = ProxySnapshot {
            db_proxy_name: "orders".to_string(),
            db_proxy_arn: Some("arn:aws:rds:us-east-1:123456789012:db-proxy:prx-1".to_string()),
            endpoint: Some("orders.proxy.example".to_string()),
            status: "available".to_string(),
            ..Default::default()
        };
        let out = ProxyFamily.output(&model(), None, Some(&snapshot));
        assert_eq!(out.db_proxy_arn, snapshot.db_proxy_arn);
        assert_eq!(out.endpoint.as_deref(), Some("orders.proxy.example"));
        assert_eq!(ProxyFamily.output(&model(), None, None), model());
    }
}
