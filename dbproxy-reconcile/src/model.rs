//! Declarative models and observed snapshots for the managed resources.
//!
//! Models are what the caller declares (desired and previous state) and what
//! a run reports back. Snapshots are the control plane's view of a resource;
//! they are only ever replaced by a fresh describe, never edited.

use serde::{Deserialize, Serialize};

/// Name of the target group every proxy is created with.
pub const DEFAULT_TARGET_GROUP: &str = "default";

// =============================================================================
// Tags and targets
// =============================================================================

/// Key/value tag attached to a proxy or proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Kind of database registered behind a target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Cluster,
    Instance,
}

/// A database cluster or instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
}

impl Target {
    pub fn cluster(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::Cluster,
        }
    }

    pub fn instance(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::Instance,
        }
    }
}

/// Health reported by the control plane for a registered target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub state: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A target as seen by the control plane after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTarget {
    pub id: String,
    pub kind: TargetKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health: Option<TargetHealth>,
}

impl RegisteredTarget {
    pub fn target(&self) -> Target {
        Target {
            id: self.id.clone(),
            kind: self.kind,
        }
    }
}

// =============================================================================
// Proxy
// =============================================================================

/// Authentication entry of a proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthFormat {
    pub auth_scheme: Option<String>,
    pub description: Option<String>,
    pub iam_auth: Option<String>,
    pub secret_arn: Option<String>,
    pub user_name: Option<String>,
}

/// Declared state of a database proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyModel {
    pub db_proxy_name: String,
    pub engine_family: String,
    pub role_arn: String,
    pub auth: Vec<AuthFormat>,
    pub vpc_subnet_ids: Vec<String>,
    pub vpc_security_group_ids: Vec<String>,
    pub require_tls: Option<bool>,
    pub idle_client_timeout: Option<u32>,
    pub debug_logging: Option<bool>,
    pub tags: Vec<Tag>,
    // Read-only, filled from the observed proxy.
    pub db_proxy_arn: Option<String>,
    pub endpoint: Option<String>,
    pub vpc_id: Option<String>,
}

/// Control-plane view of a database proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySnapshot {
    pub db_proxy_name: String,
    pub db_proxy_arn: Option<String>,
    pub status: String,
    pub engine_family: String,
    pub role_arn: Option<String>,
    pub auth: Vec<AuthFormat>,
    pub endpoint: Option<String>,
    pub vpc_id: Option<String>,
    pub vpc_subnet_ids: Vec<String>,
    pub vpc_security_group_ids: Vec<String>,
    pub require_tls: bool,
    pub idle_client_timeout: Option<u32>,
    pub debug_logging: bool,
}

// =============================================================================
// Proxy endpoint
// =============================================================================

/// Declared state of an additional proxy endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointModel {
    pub db_proxy_endpoint_name: String,
    pub db_proxy_name: String,
    pub vpc_subnet_ids: Vec<String>,
    pub vpc_security_group_ids: Vec<String>,
    pub target_role: Option<String>,
    pub tags: Vec<Tag>,
    // Read-only, filled from the observed endpoint.
    pub db_proxy_endpoint_arn: Option<String>,
    pub endpoint: Option<String>,
    pub vpc_id: Option<String>,
    pub is_default: Option<bool>,
}

/// Control-plane view of a proxy endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSnapshot {
    pub db_proxy_endpoint_name: String,
    pub db_proxy_name: String,
    pub db_proxy_endpoint_arn: Option<String>,
    pub status: String,
    pub endpoint: Option<String>,
    pub vpc_id: Option<String>,
    pub vpc_subnet_ids: Vec<String>,
    pub vpc_security_group_ids: Vec<String>,
    pub target_role: Option<String>,
    pub is_default: bool,
}

// =============================================================================
// Target group
// =============================================================================

/// Connection pool settings of a target group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub max_connections_percent: Option<u32>,
    pub max_idle_connections_percent: Option<u32>,
    pub connection_borrow_timeout: Option<u32>,
    pub session_pinning_filters: Vec<String>,
    pub init_query: Option<String>,
}

/// Declared state of a proxy target group and its registered databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetGroupModel {
    pub db_proxy_name: String,
    pub target_group_name: String,
    pub connection_pool_configuration_info: Option<ConnectionPoolConfig>,
    pub db_cluster_identifiers: Vec<String>,
    pub db_instance_identifiers: Vec<String>,
    // Read-only, filled from the observed target group.
    pub target_group_arn: Option<String>,
}

impl TargetGroupModel {
    /// All declared targets, clusters first.
    pub fn targets(&self) -> Vec<Target> {
        self.db_cluster_identifiers
            .iter()
            .map(Target::cluster)
            .chain(self.db_instance_identifiers.iter().map(Target::instance))
            .collect()
    }

    /// Target group name, falling back to the proxy's default group.
    pub fn group_name(&self) -> &str {
        if self.target_group_name.is_empty() {
            DEFAULT_TARGET_GROUP
        } else {
            &self.target_group_name
        }
    }
}

impl Default for TargetGroupModel {
    fn default() -> Self {
        Self {
            db_proxy_name: String::new(),
            target_group_name: DEFAULT_TARGET_GROUP.to_string(),
            connection_pool_configuration_info: None,
            db_cluster_identifiers: Vec::new(),
            db_instance_identifiers: Vec::new(),
            target_group_arn: None,
        }
    }
}

/// Control-plane view of a proxy target group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetGroupSnapshot {
    pub db_proxy_name: String,
    pub target_group_name: String,
    pub target_group_arn: Option<String>,
    pub status: String,
    pub is_default: bool,
    pub connection_pool_config: Option<ConnectionPoolConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_group_defaults_to_default_group() {
        let model: TargetGroupModel =
            serde_json::from_str(r#"{"db_proxy_name": "orders", "db_instance_identifiers": ["db-1"]}"#)
                .unwrap();
        assert_eq!(model.group_name(), "default");
        assert_eq!(model.targets(), vec![Target::instance("db-1")]);
    }

    #[test]
    fn empty_group_name_falls_back() {
        let model = TargetGroupModel {
            target_group_name: String::new(),
            ..Default::default()
        };
        assert_eq!(model.group_name(), DEFAULT_TARGET_GROUP);
    }
}
