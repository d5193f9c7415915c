//! Control-plane clients.
//!
//! The reconcilers only talk to the control plane through [`ControlPlane`]:
//! - proxies: create, modify, delete, describe
//! - proxy endpoints: create, modify, delete, describe
//! - target groups: describe, modify, register/deregister/describe targets
//! - tags on any resource ARN
//!
//! [`MemoryControlPlane`] keeps everything in process and is used by the
//! local driver and the tests.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ConnectionPoolConfig, EndpointModel, EndpointSnapshot, ProxyModel, ProxySnapshot,
    RegisteredTarget, Tag, Target, TargetGroupSnapshot,
};

pub use memory::MemoryControlPlane;

/// Calls the reconcilers issue against the control plane.
///
/// Mutating calls may return no snapshot; callers fall back to describing the
/// resource by name.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_proxy(&self, model: &ProxyModel) -> Result<Option<ProxySnapshot>>;

    /// Modify the proxy `name` towards `model`.
    async fn modify_proxy(&self, name: &str, model: &ProxyModel) -> Result<Option<ProxySnapshot>>;

    async fn delete_proxy(&self, name: &str) -> Result<Option<ProxySnapshot>>;

    async fn describe_proxy(&self, name: &str) -> Result<ProxySnapshot>;

    async fn create_proxy_endpoint(&self, model: &EndpointModel)
        -> Result<Option<EndpointSnapshot>>;

    /// Only the security groups of an endpoint can change after creation.
    async fn modify_proxy_endpoint(
        &self,
        name: &str,
        vpc_security_group_ids: &[String],
    ) -> Result<Option<EndpointSnapshot>>;

    async fn delete_proxy_endpoint(&self, name: &str) -> Result<Option<EndpointSnapshot>>;

    async fn describe_proxy_endpoint(&self, name: &str) -> Result<EndpointSnapshot>;

    async fn describe_target_group(&self, proxy: &str, group: &str)
        -> Result<TargetGroupSnapshot>;

    async fn modify_target_group(
        &self,
        proxy: &str,
        group: &str,
        config: &ConnectionPoolConfig,
    ) -> Result<TargetGroupSnapshot>;

    async fn register_targets(
        &self,
        proxy: &str,
        group: &str,
        targets: &[Target],
    ) -> Result<Vec<RegisteredTarget>>;

    async fn deregister_targets(&self, proxy: &str, group: &str, targets: &[Target])
        -> Result<()>;

    async fn describe_targets(&self, proxy: &str, group: &str) -> Result<Vec<RegisteredTarget>>;

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> Result<()>;

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<()>;
}
