use kube::{api::DynamicObject, Resource as _, ResourceExt as _};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{
    cluster::{Cluster, ClusterConfig, ClusterStatus, ReferencedConfig},
    management_cluster::{ImportedClusterConfig, ManagementCluster, ManagementClusterSpec},
};

use super::{cluster::ClusterHandler, GenerateError, GenerateResult};

impl ClusterHandler {
    /// Compute the objects owned by `cluster` and its new status.
    ///
    /// A cluster without any config produces no objects and keeps its status.
    pub fn generate_cluster(
        &self,
        cluster: &Cluster,
        status: ClusterStatus,
    ) -> GenerateResult<(Vec<DynamicObject>, ClusterStatus)> {
        let Some(config) = cluster.spec.config() else {
            debug!("No cluster config set, skipping");
            return Ok((vec![], status));
        };

        match config {
            ClusterConfig::Imported(_) => self.import_cluster(cluster, status),
            ClusterConfig::Referenced(reference) => {
                self.reference_cluster(cluster, status, reference)
            }
            ClusterConfig::RancherKubernetesEngine(rke) => self.create_cluster(
                cluster,
                status,
                ManagementClusterSpec {
                    rancher_kubernetes_engine_config: Some(rke.clone()),
                    local_cluster_auth_endpoint: cluster.spec.local_cluster_auth_endpoint.clone(),
                    ..Default::default()
                },
            ),
            ClusterConfig::Eks(eks) => self.create_cluster(
                cluster,
                status,
                ManagementClusterSpec {
                    eks_config: Some(eks.clone()),
                    ..Default::default()
                },
            ),
            ClusterConfig::K3s(k3s) => self.create_cluster(
                cluster,
                status,
                ManagementClusterSpec {
                    k3s_config: Some(k3s.clone()),
                    ..Default::default()
                },
            ),
            ClusterConfig::Rke2(rke2) => self.create_cluster(
                cluster,
                status,
                ManagementClusterSpec {
                    rke2_config: Some(rke2.clone()),
                    ..Default::default()
                },
            ),
        }
    }

    fn create_cluster(
        &self,
        cluster: &Cluster,
        status: ClusterStatus,
        spec: ManagementClusterSpec,
    ) -> GenerateResult<(Vec<DynamicObject>, ClusterStatus)> {
        let (object, name) = desired_cluster(cluster, spec)?;
        self.update_status(vec![object], cluster, status, &name)
    }

    fn import_cluster(
        &self,
        cluster: &Cluster,
        status: ClusterStatus,
    ) -> GenerateResult<(Vec<DynamicObject>, ClusterStatus)> {
        let (object, name) = desired_cluster(
            cluster,
            ManagementClusterSpec {
                imported_config: Some(ImportedClusterConfig {}),
                ..Default::default()
            },
        )?;
        let token = to_dynamic(&cluster.to_registration_token())?;

        self.update_status(vec![object, token], cluster, status, &name)
    }

    fn reference_cluster(
        &self,
        cluster: &Cluster,
        status: ClusterStatus,
        reference: &ReferencedConfig,
    ) -> GenerateResult<(Vec<DynamicObject>, ClusterStatus)> {
        let name = reference.management_cluster_name.as_str();
        if name.is_empty() {
            return Err(GenerateError::EmptyReference);
        }

        if self
            .downstream
            .get(name)
            .map_err(GenerateError::Lookup)?
            .is_none()
        {
            return Err(GenerateError::ReferenceNotFound(name.to_string()));
        }

        self.update_status(vec![], cluster, status, name)
    }
}

/// Build the management cluster for `cluster`, reduced to metadata and spec.
///
/// The management cluster has no status subresource, anything under `status`
/// would overwrite what rancher wrote there.
fn desired_cluster(
    cluster: &Cluster,
    spec: ManagementClusterSpec,
) -> GenerateResult<(DynamicObject, String)> {
    let desired = cluster.to_management_cluster(spec);
    let name = desired.name_any();

    let mut data = serde_json::to_value(&desired)?;
    let object = json!({
        "apiVersion": ManagementCluster::api_version(&()),
        "kind": ManagementCluster::kind(&()),
        "metadata": data.get_mut("metadata").map(Value::take),
        "spec": data.get_mut("spec").map(Value::take),
    });

    Ok((serde_json::from_value(object)?, name))
}

pub(crate) fn to_dynamic(obj: &impl Serialize) -> GenerateResult<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
