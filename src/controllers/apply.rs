use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    runtime::reflector::ObjectRef,
    Client, Resource, ResourceExt,
};
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use sha2::{Digest as _, Sha256};
use tracing::{debug, info};

use crate::api::{
    cluster::{Cluster, ClusterStatus},
    cluster_registration_token::ClusterRegistrationToken,
    management_cluster::ManagementCluster,
};

use super::{ApplyError, ApplyResult};

pub static OWNER_HASH_LABEL: &str = "objectset.rio.cattle.io/hash";
pub static OWNER_NAME_ANNOTATION: &str = "objectset.rio.cattle.io/owner-name";
pub static OWNER_NAMESPACE_ANNOTATION: &str = "objectset.rio.cattle.io/owner-namespace";
pub static OWNER_GVK_ANNOTATION: &str = "objectset.rio.cattle.io/owner-gvk";
pub static FIELD_MANAGER: &str = "rancher-cluster-operator";

static SET_ID: &str = "cluster-create";

/// (kind, namespace, name) of an applied object
type ObjectKey = (String, Option<String>, String);

/// Writes the generated objects of a cluster and removes the ones no longer
/// generated.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Applier: Send + Sync {
    /// Apply `objects` as the complete set owned by `owner` and persist `status`.
    async fn apply(
        &self,
        owner: &Cluster,
        objects: Vec<DynamicObject>,
        status: &ClusterStatus,
    ) -> ApplyResult<()>;

    /// Delete everything owned by `owner`.
    async fn cleanup(&self, owner: &Cluster) -> ApplyResult<()>;
}

/// Kinds a cluster may own, anything else is rejected on apply
fn child_kinds() -> [ApiResource; 3] {
    [
        ApiResource::erase::<ManagementCluster>(&()),
        ApiResource::erase::<ClusterRegistrationToken>(&()),
        ApiResource::erase::<Secret>(&()),
    ]
}

fn resolve(obj: &DynamicObject) -> ApplyResult<ApiResource> {
    let types = obj.types.as_ref();
    child_kinds()
        .into_iter()
        .find(|ar| types.is_some_and(|t| t.api_version == ar.api_version && t.kind == ar.kind))
        .ok_or_else(|| ApplyError::UnknownKind(types.cloned()))
}

/// Label value shared by all objects owned by `owner`
pub fn owner_hash(owner: &Cluster) -> String {
    let id = format!(
        "{SET_ID}/{}/{}",
        owner.namespace().unwrap_or_default(),
        owner.name_any()
    );
    let mut hash = hex::encode(Sha256::digest(id));
    hash.truncate(40);
    hash
}

fn owner_gvk() -> String {
    format!("{}, Kind={}", Cluster::api_version(&()), Cluster::kind(&()))
}

/// Mark `obj` as owned by `owner`
pub fn own(obj: &mut DynamicObject, owner: &Cluster) {
    obj.labels_mut()
        .insert(OWNER_HASH_LABEL.to_string(), owner_hash(owner));

    let annotations = obj.annotations_mut();
    annotations.insert(OWNER_NAME_ANNOTATION.to_string(), owner.name_any());
    annotations.insert(
        OWNER_NAMESPACE_ANNOTATION.to_string(),
        owner.namespace().unwrap_or_default(),
    );
    annotations.insert(OWNER_GVK_ANNOTATION.to_string(), owner_gvk());
}

/// The cluster owning `obj`, read back from the annotations set by [`own`]
pub fn owner_of(obj: &impl ResourceExt) -> Option<ObjectRef<Cluster>> {
    let annotations = obj.annotations();
    if annotations.get(OWNER_GVK_ANNOTATION) != Some(&owner_gvk()) {
        return None;
    }

    let name = annotations.get(OWNER_NAME_ANNOTATION)?;
    let namespace = annotations.get(OWNER_NAMESPACE_ANNOTATION)?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Server side apply against the cluster the controller runs in
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }

    async fn prune(&self, owner: &Cluster, keep: &BTreeSet<ObjectKey>) -> ApplyResult<()> {
        let selector = format!("{OWNER_HASH_LABEL}={}", owner_hash(owner));

        for ar in child_kinds() {
            let existing = self
                .api(&ar, None)
                .list_metadata(&ListParams::default().labels(&selector))
                .await
                .map_err(ApplyError::Prune)?;
            let existing = existing.into_iter().map(|obj| (obj.namespace(), obj.name_any()));

            for (kind, namespace, name) in stale(&ar.kind, existing, keep) {
                let result = self
                    .api(&ar, namespace.as_deref())
                    .delete(&name, &DeleteParams::background())
                    .await;
                if ignore_not_found(result).map_err(ApplyError::Prune)? {
                    info!(kind, name, namespace, "Pruned");
                }
            }
        }

        Ok(())
    }

    async fn update_status(&self, owner: &Cluster, status: &ClusterStatus) -> ApplyResult<()> {
        if !status_changed(owner, status) {
            debug!("Status unchanged");
            return Ok(());
        }

        let api: Api<Cluster> =
            Api::namespaced(self.client.clone(), &owner.namespace().unwrap_or_default());
        api.patch_status(
            &owner.name_any(),
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await
        .map_err(ApplyError::Status)?;

        Ok(())
    }
}

/// Objects of `kind` carrying the owner label which were not applied this round
fn stale(
    kind: &str,
    existing: impl IntoIterator<Item = (Option<String>, String)>,
    keep: &BTreeSet<ObjectKey>,
) -> Vec<ObjectKey> {
    existing
        .into_iter()
        .map(|(namespace, name)| (kind.to_string(), namespace, name))
        .filter(|key| !keep.contains(key))
        .collect()
}

/// `Ok(false)` when the object was already gone
fn ignore_not_found<T>(result: kube::Result<T>) -> kube::Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(e) => Err(e),
    }
}

fn status_changed(owner: &Cluster, status: &ClusterStatus) -> bool {
    owner.status.as_ref() != Some(status)
}

#[async_trait]
impl Applier for KubeApplier {
    async fn apply(
        &self,
        owner: &Cluster,
        objects: Vec<DynamicObject>,
        status: &ClusterStatus,
    ) -> ApplyResult<()> {
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let mut keep = BTreeSet::new();

        for mut obj in objects {
            let ar = resolve(&obj)?;
            let name = obj
                .metadata
                .name
                .clone()
                .ok_or_else(|| ApplyError::MissingName(ar.kind.clone()))?;
            own(&mut obj, owner);

            let namespace = obj.namespace();
            self.api(&ar, namespace.as_deref())
                .patch(&name, &pp, &Patch::Apply(&obj))
                .await
                .map_err(ApplyError::Apply)?;
            info!(kind = ar.kind, name, namespace, "Applied");

            keep.insert((ar.kind, namespace, name));
        }

        self.prune(owner, &keep).await?;
        self.update_status(owner, status).await
    }

    async fn cleanup(&self, owner: &Cluster) -> ApplyResult<()> {
        self.prune(owner, &BTreeSet::new()).await
    }
}
