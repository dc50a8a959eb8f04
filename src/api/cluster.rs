use std::collections::BTreeMap;

use kube::{api::ObjectMeta, CustomResource, ResourceExt as _};
use schemars::{
    gen::SchemaGenerator,
    schema::{InstanceType, Schema, SchemaObject},
    JsonSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::safe_concat_name;

use super::cluster_registration_token::{
    ClusterRegistrationToken, ClusterRegistrationTokenSpec, DEFAULT_TOKEN_NAME,
};
use super::condition::{Condition, Conditions};
use super::management_cluster::{ManagementCluster, ManagementClusterSpec};

pub static DESCRIPTION_ANNOTATION: &str = "field.cattle.io/description";

/// Prefix of every generated management cluster name
pub static MANAGEMENT_CLUSTER_PREFIX: &str = "c";

/// Cluster declares the desired downstream cluster.
///
/// At most one of the config fields is expected to be set. When several are,
/// the first one in declaration order wins, see [`ClusterSpec::config`].
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "rancher.cattle.io",
    version = "v1",
    kind = "Cluster",
    plural = "clusters",
    namespaced
)]
#[kube(status = "ClusterStatus")]
#[kube(derive = "Default", derive = "PartialEq")]
#[kube(printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#)]
#[kube(printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".status.clusterName"}"#)]
#[kube(
    printcolumn = r#"{"name":"Kubeconfig","type":"string","jsonPath":".status.clientSecretName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<Endpoint>,

    /// Import an existing cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_config: Option<ImportedConfig>,

    /// Track an already existing management cluster instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_config: Option<ReferencedConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rancher_kubernetes_engine_config: Option<EngineConfig>,

    /// Only used together with `rancherKubernetesEngineConfig`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_cluster_auth_endpoint: Option<LocalClusterAuthEndpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eks_config: Option<EngineConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3s_config: Option<EngineConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rke2_config: Option<EngineConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct Endpoint {
    pub host: String,
    pub port: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config_secret_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedConfig {
    pub management_cluster_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalClusterAuthEndpoint {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fqdn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_certs: String,
}

/// Engine specific configuration, passed through to the management cluster untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct EngineConfig(pub BTreeMap<String, Value>);

impl JsonSchema for EngineConfig {
    fn schema_name() -> String {
        "EngineConfig".to_string()
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            extensions: [(
                "x-kubernetes-preserve-unknown-fields".to_string(),
                Value::Bool(true),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }
        .into()
    }
}

/// The single configuration variant a [`ClusterSpec`] resolves to
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClusterConfig<'a> {
    Imported(&'a ImportedConfig),
    Referenced(&'a ReferencedConfig),
    RancherKubernetesEngine(&'a EngineConfig),
    Eks(&'a EngineConfig),
    K3s(&'a EngineConfig),
    Rke2(&'a EngineConfig),
}

impl ClusterSpec {
    /// Resolve the configured variant, in priority order.
    pub fn config(&self) -> Option<ClusterConfig<'_>> {
        self.imported_config
            .as_ref()
            .map(ClusterConfig::Imported)
            .or(self.referenced_config.as_ref().map(ClusterConfig::Referenced))
            .or(self
                .rancher_kubernetes_engine_config
                .as_ref()
                .map(ClusterConfig::RancherKubernetesEngine))
            .or(self.eks_config.as_ref().map(ClusterConfig::Eks))
            .or(self.k3s_config.as_ref().map(ClusterConfig::K3s))
            .or(self.rke2_config.as_ref().map(ClusterConfig::Rke2))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Set once the management cluster reported ready, never reset
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub observed_generation: i64,
    /// Name of the management.cattle.io cluster backing this object
    #[serde(default, rename = "clusterName", skip_serializing_if = "String::is_empty")]
    pub downstream_cluster_name: String,
    /// Name of the secret holding the kubeconfig
    #[serde(default, rename = "clientSecretName", skip_serializing_if = "String::is_empty")]
    pub credential_secret_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Conditions for ClusterStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl Cluster {
    /// Stable name of the management cluster derived from namespace and name
    pub fn management_cluster_name(&self) -> String {
        safe_concat_name(&[
            MANAGEMENT_CLUSTER_PREFIX,
            &self.namespace().unwrap_or_default(),
            &self.name_any(),
        ])
    }

    pub(crate) fn to_management_cluster(&self, spec: ManagementClusterSpec) -> ManagementCluster {
        ManagementCluster {
            metadata: ObjectMeta {
                name: Some(self.management_cluster_name()),
                labels: self.metadata.labels.clone(),
                annotations: self.metadata.annotations.clone(),
                ..Default::default()
            },
            spec: ManagementClusterSpec {
                display_name: self.name_any(),
                description: self
                    .annotations()
                    .get(DESCRIPTION_ANNOTATION)
                    .cloned()
                    .unwrap_or_default(),
                fleet_workspace_name: self.namespace().unwrap_or_default(),
                ..spec
            },
            status: None,
        }
    }

    pub(crate) fn to_registration_token(&self) -> ClusterRegistrationToken {
        let cluster_name = self.management_cluster_name();
        ClusterRegistrationToken {
            metadata: ObjectMeta {
                name: Some(DEFAULT_TOKEN_NAME.to_string()),
                namespace: Some(cluster_name.clone()),
                ..Default::default()
            },
            spec: ClusterRegistrationTokenSpec { cluster_name },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_follows_priority_order() {
        let spec = ClusterSpec {
            k3s_config: Some(EngineConfig::default()),
            referenced_config: Some(ReferencedConfig {
                management_cluster_name: "c-xyz".into(),
            }),
            ..Default::default()
        };
        assert!(matches!(spec.config(), Some(ClusterConfig::Referenced(_))));

        let spec = ClusterSpec {
            rke2_config: Some(EngineConfig::default()),
            eks_config: Some(EngineConfig::default()),
            ..Default::default()
        };
        assert!(matches!(spec.config(), Some(ClusterConfig::Eks(_))));

        assert_eq!(ClusterSpec::default().config(), None);
    }

    #[test]
    fn empty_variant_object_still_selects_it() {
        let spec: ClusterSpec = serde_json::from_value(json!({"importedConfig": {}})).unwrap();
        assert!(matches!(spec.config(), Some(ClusterConfig::Imported(_))));
    }

    #[test]
    fn engine_config_passes_through() {
        let raw = json!({
            "rancherKubernetesEngineConfig": {
                "kubernetesVersion": "v1.20.4-rancher1-1",
                "nodes": [{"address": "10.0.0.1", "role": ["etcd"]}]
            }
        });
        let spec: ClusterSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&spec).unwrap(), raw);
    }

    #[test]
    fn status_uses_rancher_field_names() {
        let status = ClusterStatus {
            ready: true,
            observed_generation: 3,
            downstream_cluster_name: "c-abc".into(),
            credential_secret_name: "a-kubeconfig".into(),
            conditions: vec![],
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({
                "ready": true,
                "observedGeneration": 3,
                "clusterName": "c-abc",
                "clientSecretName": "a-kubeconfig",
            })
        );
    }

    #[test]
    fn management_cluster_copies_metadata() {
        let mut cluster = Cluster::new("prod", ClusterSpec::default());
        cluster.metadata.namespace = Some("fleet-default".into());
        cluster.metadata.labels = Some([("env".to_string(), "prod".to_string())].into());
        cluster.metadata.annotations =
            Some([(DESCRIPTION_ANNOTATION.to_string(), "Production".to_string())].into());

        let mgmt = cluster.to_management_cluster(ManagementClusterSpec::default());

        assert_eq!(mgmt.metadata.name, Some(cluster.management_cluster_name()));
        assert_eq!(mgmt.metadata.labels, cluster.metadata.labels);
        assert_eq!(mgmt.metadata.annotations, cluster.metadata.annotations);
        assert_eq!(mgmt.spec.display_name, "prod");
        assert_eq!(mgmt.spec.description, "Production");
        assert_eq!(mgmt.spec.fleet_workspace_name, "fleet-default");
    }

    #[test]
    fn registration_token_lives_in_cluster_namespace() {
        let mut cluster = Cluster::new("imported", ClusterSpec::default());
        cluster.metadata.namespace = Some("fleet-default".into());

        let token = cluster.to_registration_token();
        assert_eq!(token.metadata.name.as_deref(), Some("default-token"));
        assert_eq!(token.metadata.namespace, Some(cluster.management_cluster_name()));
        assert_eq!(token.spec.cluster_name, cluster.management_cluster_name());
    }

    #[test]
    fn dotted_cluster_name_yields_a_valid_namespace() {
        let mut cluster = Cluster::new("prod.eu", ClusterSpec::default());
        cluster.metadata.namespace = Some("fleet-default".into());

        let namespace = cluster.to_registration_token().metadata.namespace.unwrap();
        assert!(namespace.starts_with("c-fleet-default-prod-eu-"), "{namespace}");
        assert!(namespace.len() <= 63);
        assert!(namespace
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}
