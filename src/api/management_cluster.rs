use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::cluster::{EngineConfig, LocalClusterAuthEndpoint};
use super::condition::{Condition, Conditions};

/// Spec of the management.cattle.io Cluster, limited to the fields this
/// controller writes.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "Cluster",
    root = "ManagementCluster",
    plural = "clusters"
)]
#[kube(status = "ManagementClusterStatus")]
#[kube(derive = "Default", derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fleet_workspace_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_config: Option<ImportedClusterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rancher_kubernetes_engine_config: Option<EngineConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_cluster_auth_endpoint: Option<LocalClusterAuthEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eks_config: Option<EngineConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3s_config: Option<EngineConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rke2_config: Option<EngineConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ImportedClusterConfig {}

/// Status is owned by rancher, only the conditions are read here
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ManagementClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Conditions for ManagementClusterStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl ManagementCluster {
    pub fn ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| super::condition::READY.is_true(status))
    }
}

#[cfg(test)]
mod tests {
    use kube::{CustomResourceExt as _, Resource as _};

    use super::*;
    use crate::fixtures;

    #[test]
    fn identifies_as_the_management_cluster_kind() {
        assert_eq!(ManagementCluster::api_version(&()), "management.cattle.io/v3");
        assert_eq!(ManagementCluster::kind(&()), "Cluster");
        assert_eq!(ManagementCluster::plural(&()), "clusters");
        assert_eq!(ManagementCluster::crd_name(), "clusters.management.cattle.io");
    }

    #[test]
    fn ready_follows_the_ready_condition() {
        assert!(fixtures::management_cluster("c-a", true).ready());
        assert!(!fixtures::management_cluster("c-a", false).ready());
        assert!(!ManagementCluster::new("c-a", Default::default()).ready());
    }
}
