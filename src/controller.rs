use std::sync::Arc;

use futures::{StreamExt, TryStreamExt as _};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Config as ControllerConfig, Controller},
        reflector, watcher,
        watcher::Config,
        WatchStreamExt as _,
    },
};
use tokio::{fs, sync::RwLock};
use tracing::{error, info};

use crate::api::{cluster::Cluster, management_cluster::ManagementCluster};
use crate::controllers::{
    apply::{self, KubeApplier},
    cluster::ClusterHandler,
    controller::{error_policy, reconcile, Context},
    index::ClusterIndex,
    kubeconfig::{KubeconfigManager, KUBECONFIG_LABEL},
};
use crate::metrics::{Diagnostics, Metrics};
use crate::settings::Settings;
use crate::Result;

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}

/// Initialize the cluster controller and run it until shutdown
pub async fn run_cluster_controller(state: State, settings: Settings) -> Result<()> {
    let client = Client::try_default().await?;

    let clusters = Api::<Cluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("Clusters are not queryable; {e:?}. Is the CRD installed?");
        return Err(e.into());
    }

    let ca_cert = match &settings.ca_cert {
        Some(path) => Some(fs::read_to_string(path).await?),
        None => None,
    };

    let index = ClusterIndex::default();

    let (downstream, downstream_writer) = reflector::store();
    let downstream_stream = watcher(
        Api::<ManagementCluster>::all(client.clone()),
        Config::default(),
    )
    .default_backoff()
    .reflect(downstream_writer)
    .touched_objects();

    let (secrets, secrets_writer) = reflector::store();
    let secrets_stream = watcher(
        Api::<Secret>::all(client.clone()),
        Config::default().labels(&format!("{KUBECONFIG_LABEL}=true")),
    )
    .default_backoff()
    .reflect(secrets_writer)
    .touched_objects();

    let (cluster_store, cluster_writer) = reflector::store();
    let cluster_index = index.clone();
    let cluster_stream = watcher(clusters, Config::default().any_semantic())
        .default_backoff()
        .reflect(cluster_writer)
        .inspect_ok(move |event| cluster_index.apply_watcher_event(event))
        .touched_objects();

    let handler = ClusterHandler {
        clusters: Arc::new(client.clone()),
        downstream: Arc::new(downstream.clone()),
        credentials: Arc::new(KubeconfigManager::new(
            &settings.server_url,
            ca_cert.as_deref(),
            &settings.token_key(),
            secrets.clone(),
        )),
        applier: Arc::new(KubeApplier::new(client.clone())),
    };

    let ctx = Arc::new(Context {
        client,
        diagnostics: state.diagnostics.clone(),
        metrics: Metrics::new()?.register(&state.registry)?,
        handler,
        index: index.clone(),
        downstream,
        secrets,
        error_requeue: settings.error_requeue(),
    });

    info!("Starting cluster controller");
    Controller::for_stream(cluster_stream, cluster_store)
        .with_config(ControllerConfig::default().concurrency(settings.concurrency))
        .watches_stream(downstream_stream, move |downstream| index.owner_of(&downstream))
        .watches_stream(secrets_stream, |secret| apply::owner_of(&secret))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}
