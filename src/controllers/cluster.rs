use std::sync::Arc;

use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    Client, ResourceExt as _,
};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, instrument};

use crate::api::cluster::{Cluster, ClusterStatus, Endpoint};

use super::{
    apply::Applier, kubeconfig::CredentialIssuer, status::DownstreamStore, DefaultingError,
    DefaultingResult, SyncResult,
};

// Placeholder for clusters created without a control plane endpoint
pub static DEFAULT_ENDPOINT_HOST: &str = "localhost";
pub const DEFAULT_ENDPOINT_PORT: i32 = 6443;

/// Persists changes to the intent object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterUpdater: Send + Sync {
    async fn update(&self, cluster: &Cluster) -> Result<Cluster, kube::Error>;
}

#[async_trait]
impl ClusterUpdater for Client {
    async fn update(&self, cluster: &Cluster) -> Result<Cluster, kube::Error> {
        let namespace = cluster.namespace().unwrap_or_default();
        Api::namespaced(self.clone(), &namespace)
            .replace(&cluster.name_any(), &PostParams::default(), cluster)
            .await
    }
}

/// Reconciles a single [`Cluster`] against its collaborators.
#[derive(Clone)]
pub struct ClusterHandler {
    pub clusters: Arc<dyn ClusterUpdater>,
    pub downstream: Arc<dyn DownstreamStore>,
    pub credentials: Arc<dyn CredentialIssuer>,
    pub applier: Arc<dyn Applier>,
}

impl ClusterHandler {
    /// Fill in the required control plane endpoint.
    ///
    /// Returns the input as is when the endpoint is already set.
    pub async fn on_change(
        &self,
        cluster: Option<Arc<Cluster>>,
    ) -> DefaultingResult<Option<Arc<Cluster>>> {
        let Some(cluster) = cluster else {
            return Ok(None);
        };

        if cluster.spec.control_plane_endpoint.is_some() {
            return Ok(Some(cluster));
        }

        let mut defaulted = Cluster::clone(&cluster);
        defaulted.spec.control_plane_endpoint = Some(Endpoint {
            host: DEFAULT_ENDPOINT_HOST.to_string(),
            port: DEFAULT_ENDPOINT_PORT,
        });

        info!(
            host = DEFAULT_ENDPOINT_HOST,
            port = DEFAULT_ENDPOINT_PORT,
            "Defaulting control plane endpoint"
        );
        let updated = self
            .clusters
            .update(&defaulted)
            .await
            .map_err(DefaultingError::Update)?;

        Ok(Some(Arc::new(updated)))
    }

    /// Run defaulting, generation and apply for one cluster, returning the
    /// status written back.
    #[instrument(skip_all, fields(name = cluster.as_ref().map(|c| c.name_any()), namespace = cluster.as_ref().and_then(|c| c.namespace())))]
    pub async fn sync(&self, cluster: Option<Arc<Cluster>>) -> SyncResult<Option<ClusterStatus>> {
        let Some(cluster) = self.on_change(cluster).await? else {
            return Ok(None);
        };

        let current = cluster.status.clone().unwrap_or_default();
        let (objects, status) = self.generate_cluster(&cluster, current)?;
        debug!(objects = objects.len(), ready = status.ready, "Generated");

        self.applier.apply(&cluster, objects, &status).await?;

        Ok(Some(status))
    }

    /// Remove everything generated for a deleted cluster
    pub async fn cleanup(&self, cluster: &Cluster) -> SyncResult<()> {
        Ok(self.applier.cleanup(cluster).await?)
    }
}
