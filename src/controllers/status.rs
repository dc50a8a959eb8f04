use std::sync::Arc;

use kube::{
    api::DynamicObject,
    runtime::reflector::{ObjectRef, Store},
    ResourceExt as _,
};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::api::{
    cluster::{Cluster, ClusterStatus},
    condition::{set_active, set_transitioning},
    management_cluster::ManagementCluster,
};

use super::{
    cluster::ClusterHandler,
    generate::to_dynamic,
    GenerateError, GenerateResult,
};

/// Read access to management clusters
#[cfg_attr(test, automock)]
pub trait DownstreamStore: Send + Sync {
    /// `Ok(None)` when the cluster does not exist (yet).
    fn get(&self, name: &str) -> Result<Option<Arc<ManagementCluster>>, kube::Error>;
}

impl DownstreamStore for Store<ManagementCluster> {
    fn get(&self, name: &str) -> Result<Option<Arc<ManagementCluster>>, kube::Error> {
        Ok(Store::get(self, &ObjectRef::new(name)))
    }
}

/// Readiness never goes back to false, a reset would prune the kubeconfig secret.
pub fn merge_ready(current: bool, observed: bool) -> bool {
    current || observed
}

impl ClusterHandler {
    /// Merge the state of management cluster `name` into `status`, and attach
    /// the kubeconfig secret once the cluster is ready.
    pub(crate) fn update_status(
        &self,
        mut objects: Vec<DynamicObject>,
        cluster: &Cluster,
        mut status: ClusterStatus,
        name: &str,
    ) -> GenerateResult<(Vec<DynamicObject>, ClusterStatus)> {
        let observed = self
            .downstream
            .get(name)
            .map_err(GenerateError::Lookup)?
            .is_some_and(|existing| existing.ready());

        status.ready = merge_ready(status.ready, observed);
        status.observed_generation = cluster.metadata.generation.unwrap_or_default();
        status.downstream_cluster_name = name.to_string();

        match status.ready {
            true => set_active(&mut status),
            false => set_transitioning(&mut status, ""),
        }

        if status.ready {
            let secret = self
                .credentials
                .issue(cluster, &status)?
                .ok_or_else(|| GenerateError::MissingCredential(cluster.name_any()))?;
            debug!(secret = secret.name_any(), "Attaching kubeconfig secret");
            status.credential_secret_name = secret.name_any();
            objects.push(to_dynamic(&secret)?);
        }

        Ok((objects, status))
    }
}
