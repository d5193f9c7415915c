//! In-memory control plane.
//!
//! Resources move through scripted status sequences: every describe call
//! consumes the next pending status, and a resource being deleted disappears
//! once its sequence is drained. All calls are recorded, and a failure can be
//! queued for any operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::ControlPlane;
use crate::error::{ControlPlaneError, Result};
use crate::health::AVAILABLE_HEALTH_STATE;
use crate::model::{
    ConnectionPoolConfig, EndpointModel, EndpointSnapshot, ProxyModel, ProxySnapshot,
    RegisteredTarget, Tag, Target, TargetGroupModel, TargetGroupSnapshot, TargetHealth,
    TargetKind, DEFAULT_TARGET_GROUP,
};

const REGION: &str = "us-east-1";
const ACCOUNT: &str = "123456789012";

/// Control-plane operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProxy,
    ModifyProxy,
    DeleteProxy,
    DescribeProxy,
    CreateEndpoint,
    ModifyEndpoint,
    DeleteEndpoint,
    DescribeEndpoint,
    DescribeTargetGroup,
    ModifyTargetGroup,
    RegisterTargets,
    DeregisterTargets,
    DescribeTargets,
    AddTags,
    RemoveTags,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub resource: String,
    /// Tags as `key=value`, tag keys, or target ids, depending on the call.
    pub items: Vec<String>,
}

/// A resource together with the statuses it will report next.
struct Tracked<S> {
    snapshot: S,
    pending: VecDeque<String>,
    vanish_when_drained: bool,
}

impl<S: Clone> Tracked<S> {
    fn settled(snapshot: S) -> Self {
        Self {
            snapshot,
            pending: VecDeque::new(),
            vanish_when_drained: false,
        }
    }

    /// Advance one status; `None` once a deleted resource is gone.
    fn observe(&mut self, set_status: impl FnOnce(&mut S, String)) -> Option<S> {
        if let Some(next) = self.pending.pop_front() {
            set_status(&mut self.snapshot, next);
            return Some(self.snapshot.clone());
        }
        if self.vanish_when_drained {
            None
        } else {
            Some(self.snapshot.clone())
        }
    }
}

#[derive(Default)]
struct State {
    proxies: BTreeMap<String, Tracked<ProxySnapshot>>,
    endpoints: BTreeMap<String, Tracked<EndpointSnapshot>>,
    target_groups: BTreeMap<(String, String), TargetGroupSnapshot>,
    targets: BTreeMap<(String, String), BTreeMap<String, RegisteredTarget>>,
    health: HashMap<String, VecDeque<Option<String>>>,
    tags: HashMap<String, BTreeMap<String, String>>,
    faults: HashMap<Operation, VecDeque<ControlPlaneError>>,
    calls: Vec<Call>,
}

impl State {
    fn record(&mut self, operation: Operation, resource: &str, items: Vec<String>) -> Result<()> {
        debug!("memory control plane: {:?} {} {:?}", operation, resource, items);
        self.calls.push(Call {
            operation,
            resource: resource.to_string(),
            items,
        });
        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn live_proxy(&self, name: &str) -> Result<&ProxySnapshot> {
        let proxy = self
            .proxies
            .get(name)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("DB proxy {} not found", name)))?;
        if proxy.snapshot.status == "deleting" {
            return Err(ControlPlaneError::InvalidState(format!(
                "DB proxy {} is being deleted",
                name
            )));
        }
        Ok(&proxy.snapshot)
    }

    fn group_key(&self, proxy: &str, group: &str) -> Result<(String, String)> {
        let key = (proxy.to_string(), group.to_string());
        if !self.proxies.contains_key(proxy) {
            return Err(ControlPlaneError::NotFound(format!(
                "DB proxy {} not found",
                proxy
            )));
        }
        if !self.target_groups.contains_key(&key) {
            return Err(ControlPlaneError::NotFound(format!(
                "target group {} of DB proxy {} not found",
                group, proxy
            )));
        }
        Ok(key)
    }

    /// Next scripted health for `id`; the last scripted entry sticks.
    fn next_health(&mut self, id: &str, kind: TargetKind, advance: bool) -> Option<TargetHealth> {
        let state = match self.health.get_mut(id) {
            Some(queue) if advance && queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().cloned().flatten(),
            None => match kind {
                TargetKind::Instance => Some(AVAILABLE_HEALTH_STATE.to_string()),
                TargetKind::Cluster => None,
            },
        };
        state.map(|state| TargetHealth {
            state,
            reason: None,
            description: None,
        })
    }

    fn insert_proxy(&mut self, model: &ProxyModel, status: &str) -> ProxySnapshot {
        let snapshot = ProxySnapshot {
            db_proxy_name: model.db_proxy_name.clone(),
            db_proxy_arn: Some(arn("db-proxy", "prx")),
            status: status.to_string(),
            engine_family: model.engine_family.clone(),
            role_arn: Some(model.role_arn.clone()),
            auth: model.auth.clone(),
            endpoint: Some(format!(
                "{}.proxy-{}.{}.rds.amazonaws.com",
                model.db_proxy_name,
                short_id(),
                REGION
            )),
            vpc_id: Some(format!("vpc-{}", short_id())),
            vpc_subnet_ids: model.vpc_subnet_ids.clone(),
            vpc_security_group_ids: model.vpc_security_group_ids.clone(),
            require_tls: model.require_tls.unwrap_or(false),
            idle_client_timeout: model.idle_client_timeout.or(Some(1800)),
            debug_logging: model.debug_logging.unwrap_or(false),
        };
        self.set_tags(snapshot.db_proxy_arn.as_deref(), &model.tags);
        self.proxies
            .insert(model.db_proxy_name.clone(), Tracked::settled(snapshot.clone()));

        let group = TargetGroupSnapshot {
            db_proxy_name: model.db_proxy_name.clone(),
            target_group_name: DEFAULT_TARGET_GROUP.to_string(),
            target_group_arn: Some(arn("target-group", "prx-tg")),
            status: "available".to_string(),
            is_default: true,
            connection_pool_config: Some(ConnectionPoolConfig {
                max_connections_percent: Some(100),
                max_idle_connections_percent: Some(50),
                connection_borrow_timeout: Some(120),
                ..Default::default()
            }),
        };
        let key = (model.db_proxy_name.clone(), DEFAULT_TARGET_GROUP.to_string());
        self.target_groups.insert(key.clone(), group);
        self.targets.insert(key, BTreeMap::new());
        snapshot
    }

    fn insert_endpoint(&mut self, model: &EndpointModel, status: &str) -> EndpointSnapshot {
        let vpc_id = self
            .proxies
            .get(&model.db_proxy_name)
            .and_then(|p| p.snapshot.vpc_id.clone());
        let snapshot = EndpointSnapshot {
            db_proxy_endpoint_name: model.db_proxy_endpoint_name.clone(),
            db_proxy_name: model.db_proxy_name.clone(),
            db_proxy_endpoint_arn: Some(arn("db-proxy-endpoint", "prx-endpoint")),
            status: status.to_string(),
            endpoint: Some(format!(
                "{}.endpoint.proxy-{}.{}.rds.amazonaws.com",
                model.db_proxy_endpoint_name,
                short_id(),
                REGION
            )),
            vpc_id,
            vpc_subnet_ids: model.vpc_subnet_ids.clone(),
            vpc_security_group_ids: model.vpc_security_group_ids.clone(),
            target_role: Some(
                model
                    .target_role
                    .clone()
                    .unwrap_or_else(|| "READ_WRITE".to_string()),
            ),
            is_default: false,
        };
        self.set_tags(snapshot.db_proxy_endpoint_arn.as_deref(), &model.tags);
        self.endpoints.insert(
            model.db_proxy_endpoint_name.clone(),
            Tracked::settled(snapshot.clone()),
        );
        snapshot
    }

    fn set_tags(&mut self, arn: Option<&str>, tags: &[Tag]) {
        if let Some(arn) = arn {
            let entry = self.tags.entry(arn.to_string()).or_default();
            for tag in tags {
                entry.insert(tag.key.clone(), tag.value.clone());
            }
        }
    }
}

/// Thread-safe in-process [`ControlPlane`].
pub struct MemoryControlPlane {
    state: Mutex<State>,
    /// Transitional statuses reported before a change settles.
    settle_after: usize,
}

impl MemoryControlPlane {
    /// `settle_after` is the number of transitional statuses every create,
    /// modify or delete reports before it settles.
    pub fn new(settle_after: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            settle_after,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, transitional: &str, settled: Option<&str>) -> VecDeque<String> {
        let mut pending: VecDeque<String> = std::iter::repeat(transitional.to_string())
            .take(self.settle_after)
            .collect();
        pending.extend(settled.map(str::to_string));
        pending
    }

    // =========================================================================
    // Seeding and scripting
    // =========================================================================

    /// Add an existing, available proxy.
    pub fn seed_proxy(&self, model: &ProxyModel) -> ProxySnapshot {
        self.state().insert_proxy(model, "available")
    }

    /// Add an existing, available endpoint.
    pub fn seed_endpoint(&self, model: &EndpointModel) -> EndpointSnapshot {
        self.state().insert_endpoint(model, "available")
    }

    /// Make sure the group of `model` exists with its declared targets
    /// registered. The owning proxy is seeded when missing.
    pub fn seed_target_group(&self, model: &TargetGroupModel) -> TargetGroupSnapshot {
        let mut state = self.state();
        if !state.proxies.contains_key(&model.db_proxy_name) {
            state.insert_proxy(
                &ProxyModel {
                    db_proxy_name: model.db_proxy_name.clone(),
                    engine_family: "POSTGRESQL".to_string(),
                    ..Default::default()
                },
                "available",
            );
        }
        let key = (model.db_proxy_name.clone(), model.group_name().to_string());
        let group = state
            .target_groups
            .entry(key.clone())
            .or_insert_with(|| TargetGroupSnapshot {
                db_proxy_name: model.db_proxy_name.clone(),
                target_group_name: model.group_name().to_string(),
                target_group_arn: Some(arn("target-group", "prx-tg")),
                status: "available".to_string(),
                is_default: false,
                connection_pool_config: None,
            })
            .clone();
        for target in model.targets() {
            let health = state.next_health(&target.id, target.kind, false);
            state.targets.entry(key.clone()).or_default().insert(
                target.id.clone(),
                registered(&target, health),
            );
        }
        group
    }

    /// Replace the statuses the proxy `name` reports on its next describes.
    pub fn script_proxy(&self, name: &str, statuses: &[&str]) {
        if let Some(proxy) = self.state().proxies.get_mut(name) {
            proxy.pending = statuses.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Replace the statuses the endpoint `name` reports on its next describes.
    pub fn script_endpoint(&self, name: &str, statuses: &[&str]) {
        if let Some(endpoint) = self.state().endpoints.get_mut(name) {
            endpoint.pending = statuses.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Health states target `id` reports on successive describes.
    pub fn script_target_health(&self, id: &str, states: &[Option<&str>]) {
        self.state().health.insert(
            id.to_string(),
            states.iter().map(|s| s.map(str::to_string)).collect(),
        );
    }

    /// Drop a proxy behind the reconciler's back.
    pub fn remove_proxy(&self, name: &str) {
        self.state().proxies.remove(name);
    }

    /// Fail the next call of `operation` with `err`.
    pub fn fail_next(&self, operation: Operation, err: ControlPlaneError) {
        self.state()
            .faults
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, operation: Operation) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls_to(operation).len()
    }

    /// Current proxy snapshot without advancing its status script.
    pub fn proxy(&self, name: &str) -> Option<ProxySnapshot> {
        self.state().proxies.get(name).map(|p| p.snapshot.clone())
    }

    pub fn endpoint(&self, name: &str) -> Option<EndpointSnapshot> {
        self.state().endpoints.get(name).map(|e| e.snapshot.clone())
    }

    /// Tags on `arn`, sorted by key.
    pub fn tags_of(&self, arn: &str) -> Vec<Tag> {
        self.state()
            .tags
            .get(arn)
            .map(|tags| tags.iter().map(|(k, v)| Tag::new(k, v)).collect())
            .unwrap_or_default()
    }

    /// Ids of the targets registered in a group, sorted.
    pub fn registered_ids(&self, proxy: &str, group: &str) -> Vec<String> {
        self.state()
            .targets
            .get(&(proxy.to_string(), group.to_string()))
            .map(|targets| targets.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn create_proxy(&self, model: &ProxyModel) -> Result<Option<ProxySnapshot>> {
        let pending = self.transition("creating", Some("available"));
        let mut state = self.state();
        state.record(Operation::CreateProxy, &model.db_proxy_name, tag_items(&model.tags))?;
        if state.proxies.contains_key(&model.db_proxy_name) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "DB proxy {} already exists",
                model.db_proxy_name
            )));
        }
        let snapshot = state.insert_proxy(model, "creating");
        if let Some(proxy) = state.proxies.get_mut(&model.db_proxy_name) {
            proxy.pending = pending;
        }
        Ok(Some(snapshot))
    }

    async fn modify_proxy(&self, name: &str, model: &ProxyModel) -> Result<Option<ProxySnapshot>> {
        let pending = self.transition("modifying", Some("available"));
        let mut state = self.state();
        state.record(Operation::ModifyProxy, name, Vec::new())?;
        let proxy = state
            .proxies
            .get_mut(name)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("DB proxy {} not found", name)))?;
        let snapshot = &mut proxy.snapshot;
        snapshot.status = "modifying".to_string();
        snapshot.role_arn = Some(model.role_arn.clone());
        snapshot.auth = model.auth.clone();
        snapshot.vpc_security_group_ids = model.vpc_security_group_ids.clone();
        snapshot.require_tls = model.require_tls.unwrap_or(snapshot.require_tls);
        snapshot.idle_client_timeout = model.idle_client_timeout.or(snapshot.idle_client_timeout);
        snapshot.debug_logging = model.debug_logging.unwrap_or(snapshot.debug_logging);
        proxy.pending = pending;
        Ok(Some(proxy.snapshot.clone()))
    }

    async fn delete_proxy(&self, name: &str) -> Result<Option<ProxySnapshot>> {
        let pending = self.transition("deleting", None);
        let mut state = self.state();
        state.record(Operation::DeleteProxy, name, Vec::new())?;
        let proxy = state
            .proxies
            .get_mut(name)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("DB proxy {} not found", name)))?;
        proxy.snapshot.status = "deleting".to_string();
        proxy.pending = pending;
        proxy.vanish_when_drained = true;
        let snapshot = proxy.snapshot.clone();
        state.target_groups.retain(|(proxy, _), _| proxy != name);
        state.targets.retain(|(proxy, _), _| proxy != name);
        Ok(Some(snapshot))
    }

    async fn describe_proxy(&self, name: &str) -> Result<ProxySnapshot> {
        let mut state = self.state();
        state.record(Operation::DescribeProxy, name, Vec::new())?;
        let observed = state
            .proxies
            .get_mut(name)
            .and_then(|proxy| proxy.observe(|s, status| s.status = status));
        match observed {
            Some(snapshot) => Ok(snapshot),
            None => {
                state.proxies.remove(name);
                Err(ControlPlaneError::NotFound(format!(
                    "DB proxy {} not found",
                    name
                )))
            }
        }
    }

    async fn create_proxy_endpoint(
        &self,
        model: &EndpointModel,
    ) -> Result<Option<EndpointSnapshot>> {
        let pending = self.transition("creating", Some("available"));
        let mut state = self.state();
        state.record(
            Operation::CreateEndpoint,
            &model.db_proxy_endpoint_name,
            tag_items(&model.tags),
        )?;
        state.live_proxy(&model.db_proxy_name)?;
        if state.endpoints.contains_key(&model.db_proxy_endpoint_name) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "DB proxy endpoint {} already exists",
                model.db_proxy_endpoint_name
            )));
        }
        let snapshot = state.insert_endpoint(model, "creating");
        if let Some(endpoint) = state.endpoints.get_mut(&model.db_proxy_endpoint_name) {
            endpoint.pending = pending;
        }
        Ok(Some(snapshot))
    }

    async fn modify_proxy_endpoint(
        &self,
        name: &str,
        vpc_security_group_ids: &[String],
    ) -> Result<Option<EndpointSnapshot>> {
        let pending = self.transition("modifying", Some("available"));
        let mut state = self.state();
        state.record(Operation::ModifyEndpoint, name, vpc_security_group_ids.to_vec())?;
        let endpoint = state.endpoints.get_mut(name).ok_or_else(|| {
            ControlPlaneError::NotFound(format!("DB proxy endpoint {} not found", name))
        })?;
        endpoint.snapshot.status = "modifying".to_string();
        endpoint.snapshot.vpc_security_group_ids = vpc_security_group_ids.to_vec();
        endpoint.pending = pending;
        Ok(Some(endpoint.snapshot.clone()))
    }

    async fn delete_proxy_endpoint(&self, name: &str) -> Result<Option<EndpointSnapshot>> {
        let pending = self.transition("deleting", None);
        let mut state = self.state();
        state.record(Operation::DeleteEndpoint, name, Vec::new())?;
        let endpoint = state.endpoints.get_mut(name).ok_or_else(|| {
            ControlPlaneError::NotFound(format!("DB proxy endpoint {} not found", name))
        })?;
        endpoint.snapshot.status = "deleting".to_string();
        endpoint.pending = pending;
        endpoint.vanish_when_drained = true;
        Ok(Some(endpoint.snapshot.clone()))
    }

    async fn describe_proxy_endpoint(&self, name: &str) -> Result<EndpointSnapshot> {
        let mut state = self.state();
        state.record(Operation::DescribeEndpoint, name, Vec::new())?;
        let observed = state
            .endpoints
            .get_mut(name)
            .and_then(|endpoint| endpoint.observe(|s, status| s.status = status));
        match observed {
            Some(snapshot) => Ok(snapshot),
            None => {
                state.endpoints.remove(name);
                Err(ControlPlaneError::NotFound(format!(
                    "DB proxy endpoint {} not found",
                    name
                )))
            }
        }
    }

    async fn describe_target_group(
        &self,
        proxy: &str,
        group: &str,
    ) -> Result<TargetGroupSnapshot> {
        let mut state = self.state();
        state.record(Operation::DescribeTargetGroup, proxy, vec![group.to_string()])?;
        let key = state.group_key(proxy, group)?;
        state
            .target_groups
            .get(&key)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("target group {} not found", group)))
    }

    async fn modify_target_group(
        &self,
        proxy: &str,
        group: &str,
        config: &ConnectionPoolConfig,
    ) -> Result<TargetGroupSnapshot> {
        let mut state = self.state();
        state.record(Operation::ModifyTargetGroup, proxy, vec![group.to_string()])?;
        state.live_proxy(proxy)?;
        let key = state.group_key(proxy, group)?;
        let snapshot = state
            .target_groups
            .get_mut(&key)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("target group {} not found", group)))?;
        snapshot.connection_pool_config = Some(config.clone());
        Ok(snapshot.clone())
    }

    async fn register_targets(
        &self,
        proxy: &str,
        group: &str,
        targets: &[Target],
    ) -> Result<Vec<RegisteredTarget>> {
        let mut state = self.state();
        state.record(Operation::RegisterTargets, proxy, target_items(targets))?;
        state.live_proxy(proxy)?;
        let key = state.group_key(proxy, group)?;
        let mut registered_now = Vec::with_capacity(targets.len());
        for target in targets {
            let health = state.next_health(&target.id, target.kind, false);
            let entry = registered(target, health);
            state
                .targets
                .entry(key.clone())
                .or_default()
                .insert(target.id.clone(), entry.clone());
            registered_now.push(entry);
        }
        Ok(registered_now)
    }

    async fn deregister_targets(
        &self,
        proxy: &str,
        group: &str,
        targets: &[Target],
    ) -> Result<()> {
        let mut state = self.state();
        state.record(Operation::DeregisterTargets, proxy, target_items(targets))?;
        state.live_proxy(proxy)?;
        let key = state.group_key(proxy, group)?;
        if let Some(registered) = state.targets.get_mut(&key) {
            for target in targets {
                registered.remove(&target.id);
            }
        }
        Ok(())
    }

    async fn describe_targets(&self, proxy: &str, group: &str) -> Result<Vec<RegisteredTarget>> {
        let mut state = self.state();
        state.record(Operation::DescribeTargets, proxy, vec![group.to_string()])?;
        let key = state.group_key(proxy, group)?;
        let current: Vec<Target> = state
            .targets
            .get(&key)
            .map(|targets| targets.values().map(RegisteredTarget::target).collect())
            .unwrap_or_default();
        let mut described = Vec::with_capacity(current.len());
        for target in current {
            let health = state.next_health(&target.id, target.kind, true);
            let entry = registered(&target, health);
            if let Some(targets) = state.targets.get_mut(&key) {
                targets.insert(target.id.clone(), entry.clone());
            }
            described.push(entry);
        }
        Ok(described)
    }

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.state();
        state.record(Operation::AddTags, arn, tag_items(tags))?;
        state.set_tags(Some(arn), tags);
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<()> {
        let mut state = self.state();
        state.record(Operation::RemoveTags, arn, keys.to_vec())?;
        if let Some(tags) = state.tags.get_mut(arn) {
            for key in keys {
                tags.remove(key);
            }
        }
        Ok(())
    }
}

fn registered(target: &Target, health: Option<TargetHealth>) -> RegisteredTarget {
    RegisteredTarget {
        id: target.id.clone(),
        kind: target.kind,
        endpoint: Some(format!("{}.{}.rds.amazonaws.com", target.id, REGION)),
        port: Some(5432),
        health,
    }
}

fn arn(kind: &str, prefix: &str) -> String {
    format!(
        "arn:aws:rds:{}:{}:{}:{}-{}",
        REGION,
        ACCOUNT,
        kind,
        prefix,
        Uuid::new_v4().simple()
    )
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn tag_items(tags: &[Tag]) -> Vec<String> {
    tags.iter().map(|t| format!("{}={}", t.key, t.value)).collect()
}

fn target_items(targets: &[Target]) -> Vec<String> {
    targets.iter().map(|t| t.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_model(name: &str) -> ProxyModel {
        ProxyModel {
            db_proxy_name: name.to_string(),
            engine_family: "POSTGRESQL".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_proxy_settles_after_scripted_statuses() {
        let cp = MemoryControlPlane::new(2);
        let created = cp.create_proxy(&proxy_model("orders")).await.unwrap().unwrap();
        assert_eq!(created.status, "creating");

        let statuses: Vec<String> = [
            cp.describe_proxy("orders").await.unwrap(),
            cp.describe_proxy("orders").await.unwrap(),
            cp.describe_proxy("orders").await.unwrap(),
            cp.describe_proxy("orders").await.unwrap(),
        ]
        .into_iter()
        .map(|p| p.status)
        .collect();
        assert_eq!(statuses, vec!["creating", "creating", "available", "available"]);
    }

    #[tokio::test]
    async fn deleted_proxy_vanishes() {
        let cp = MemoryControlPlane::new(1);
        cp.seed_proxy(&proxy_model("orders"));
        cp.delete_proxy("orders").await.unwrap();

        assert_eq!(cp.describe_proxy("orders").await.unwrap().status, "deleting");
        assert!(matches!(
            cp.describe_proxy("orders").await,
            Err(ControlPlaneError::NotFound(_))
        ));
        assert!(cp.proxy("orders").is_none());
    }

    #[tokio::test]
    async fn queued_fault_fails_once() {
        let cp = MemoryControlPlane::default();
        cp.seed_proxy(&proxy_model("orders"));
        cp.fail_next(
            Operation::DescribeProxy,
            ControlPlaneError::Service("throttled".to_string()),
        );

        assert!(cp.describe_proxy("orders").await.is_err());
        assert!(cp.describe_proxy("orders").await.is_ok());
        assert_eq!(cp.count(Operation::DescribeProxy), 2);
    }

    #[tokio::test]
    async fn scripted_health_advances_per_describe() {
        let cp = MemoryControlPlane::default();
        let model = TargetGroupModel {
            db_proxy_name: "orders".to_string(),
            ..Default::default()
        };
        cp.seed_target_group(&model);
        cp.script_target_health("db-1", &[Some("UNAVAILABLE"), Some("AVAILABLE")]);
        cp.register_targets("orders", "default", &[Target::instance("db-1")])
            .await
            .unwrap();

        let first = cp.describe_targets("orders", "default").await.unwrap();
        let second = cp.describe_targets("orders", "default").await.unwrap();
        assert_eq!(first[0].health.as_ref().unwrap().state, "UNAVAILABLE");
        assert_eq!(second[0].health.as_ref().unwrap().state, "AVAILABLE");
    }
}
