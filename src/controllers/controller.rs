use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::Action,
        events::{Event, EventType},
        finalizer,
        reflector::Store,
    },
    Resource as _, ResourceExt as _,
};
use tokio::{sync::RwLock, time::Duration};
use tracing::{debug, info, instrument, warn};

use crate::api::{cluster::Cluster, management_cluster::ManagementCluster};
use crate::metrics::Diagnostics;
use crate::{telemetry, Error, Metrics};

use super::{cluster::ClusterHandler, index::ClusterIndex};

pub static CLUSTER_FINALIZER: &str = "rancher.cattle.io/cluster-create";

// Context for the reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prom metrics
    pub metrics: Metrics,
    pub handler: ClusterHandler,
    /// Management cluster name to owning clusters
    pub index: ClusterIndex,
    pub downstream: Store<ManagementCluster>,
    pub secrets: Store<Secret>,
    pub error_requeue: Duration,
}

impl Context {
    /// Block until every cache read during reconcile holds a full list
    async fn wait_for_caches(&self) -> crate::Result<()> {
        self.downstream.wait_until_ready().await?;
        self.secrets.wait_until_ready().await?;
        Ok(())
    }

    async fn publish(&self, cluster: &Cluster, event: Event) -> crate::Result<()> {
        self.diagnostics
            .read()
            .await
            .recorder(self.client.clone())
            .publish(&event, &cluster.object_ref(&()))
            .await?;
        Ok(())
    }
}

#[instrument(skip_all, fields(trace_id = display(telemetry::get_trace_id()), name = cluster.name_any(), namespace = cluster.namespace()), err)]
pub async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> crate::Result<Action> {
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();
    ctx.wait_for_caches().await?;

    let namespace = cluster.namespace().unwrap_or_default();
    let api: Api<Cluster> = Api::namespaced(ctx.client.clone(), &namespace);
    debug!("Reconciling");

    finalizer(&api, CLUSTER_FINALIZER, cluster, |event| async {
        match event {
            finalizer::Event::Apply(c) => sync(c, ctx.clone()).await,
            finalizer::Event::Cleanup(c) => cleanup(c, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn sync(cluster: Arc<Cluster>, ctx: Arc<Context>) -> crate::Result<Action> {
    let was_ready = cluster.status.as_ref().is_some_and(|s| s.ready);
    let status = ctx.handler.sync(Some(cluster.clone())).await?;

    if !was_ready && status.as_ref().is_some_and(|s| s.ready) {
        info!("Cluster is ready");
        ctx.publish(
            &cluster,
            Event {
                type_: EventType::Normal,
                reason: "Ready".into(),
                note: status.map(|s| {
                    format!("Management cluster `{}` is ready", s.downstream_cluster_name)
                }),
                action: "Provisioning".into(),
                secondary: None,
            },
        )
        .await?;
    }

    Ok(Action::await_change())
}

async fn cleanup(cluster: Arc<Cluster>, ctx: Arc<Context>) -> crate::Result<Action> {
    ctx.publish(
        &cluster,
        Event {
            type_: EventType::Normal,
            reason: "DeleteRequested".into(),
            note: Some(format!("Delete `{}`", cluster.name_any())),
            action: "Deleting".into(),
            secondary: None,
        },
    )
    .await?;

    ctx.handler.cleanup(&cluster).await?;
    Ok(Action::await_change())
}

pub fn error_policy(cluster: Arc<Cluster>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&cluster, error);
    Action::requeue(ctx.error_requeue)
}
