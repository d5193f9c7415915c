//! Health gate for target groups.

use crate::model::{RegisteredTarget, TargetKind};

/// Health state a target must report before its group is declared ready.
pub const AVAILABLE_HEALTH_STATE: &str = "AVAILABLE";

/// Instances must report [`AVAILABLE_HEALTH_STATE`]. Clusters do not always
/// report health, so a cluster without a health entry counts as healthy.
pub fn is_healthy(target: &RegisteredTarget) -> bool {
    match (&target.health, target.kind) {
        (Some(health), _) => health.state == AVAILABLE_HEALTH_STATE,
        (None, TargetKind::Cluster) => true,
        (None, TargetKind::Instance) => false,
    }
}

/// First target that keeps the gate closed, if any.
pub fn first_unhealthy(targets: &[RegisteredTarget]) -> Option<&RegisteredTarget> {
    targets.iter().find(|target| !is_healthy(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetHealth;

    fn target(id: &str, kind: TargetKind, state: Option<&str>) -> RegisteredTarget {
        RegisteredTarget {
            id: id.to_string(),
            kind,
            endpoint: None,
            port: None,
            health: state.map(|s| TargetHealth {
                state: s.to_string(),
                reason: None,
                description: None,
            }),
        }
    }

    #[test]
    fn empty_group_is_healthy() {
        assert!(first_unhealthy(&[]).is_none());
    }

    #[test]
    fn instance_must_be_available() {
        assert!(is_healthy(&target("db-1", TargetKind::Instance, Some("AVAILABLE"))));
        assert!(!is_healthy(&target("db-1", TargetKind::Instance, Some("UNAVAILABLE"))));
        assert!(!is_healthy(&target("db-1", TargetKind::Instance, None)));
    }

    #[test]
    fn cluster_without_health_is_healthy() {
        assert!(is_healthy(&target("c-1", TargetKind::Cluster, None)));
        assert!(!is_healthy(&target("c-1", TargetKind::Cluster, Some("REGISTERING"))));
    }

    #[test]
    fn one_bad_target_closes_the_gate() {
        let targets = vec![
            target("c-1", TargetKind::Cluster, None),
            target("db-1", TargetKind::Instance, Some("AVAILABLE")),
            target("db-2", TargetKind::Instance, Some("UNAVAILABLE")),
        ];
        assert_eq!(first_unhealthy(&targets).map(|t| t.id.as_str()), Some("db-2"));
    }
}
