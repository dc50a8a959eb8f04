//! Helper methods only available for tests
use kube::{api::ObjectMeta, core::ErrorResponse};

use crate::api::{
    cluster::{Cluster, ClusterSpec, ClusterStatus, EngineConfig, Endpoint},
    condition::{Condition, READY},
    management_cluster::{ManagementCluster, ManagementClusterSpec, ManagementClusterStatus},
};

pub fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: "injected failure".into(),
        reason: "InternalError".into(),
        code,
    })
}

pub fn cluster(namespace: &str, name: &str, spec: ClusterSpec) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            generation: Some(1),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Cluster with an RKE config and an endpoint already set
pub fn rke_cluster(namespace: &str, name: &str) -> Cluster {
    cluster(
        namespace,
        name,
        ClusterSpec {
            control_plane_endpoint: Some(Endpoint {
                host: "10.0.0.10".into(),
                port: 6443,
            }),
            rancher_kubernetes_engine_config: Some(EngineConfig(
                [(
                    "kubernetesVersion".to_string(),
                    "v1.20.4-rancher1-1".into(),
                )]
                .into(),
            )),
            ..Default::default()
        },
    )
}

pub fn with_status(mut cluster: Cluster, status: ClusterStatus) -> Cluster {
    cluster.status = Some(status);
    cluster
}

pub fn management_cluster(name: &str, ready: bool) -> ManagementCluster {
    ManagementCluster {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        spec: ManagementClusterSpec::default(),
        status: Some(ManagementClusterStatus {
            conditions: vec![Condition {
                type_: READY.0.into(),
                status: match ready {
                    true => "True",
                    false => "False",
                }
                .into(),
                ..Default::default()
            }],
        }),
    }
}
