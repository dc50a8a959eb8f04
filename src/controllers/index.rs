use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use kube::{
    runtime::{reflector::ObjectRef, watcher},
    ResourceExt as _,
};
use tracing::debug;

use crate::api::{cluster::Cluster, management_cluster::ManagementCluster};

/// (namespace, name) of an indexed cluster, ordered for deterministic lookups
type OwnerKey = (String, String);

/// Maps management cluster names to the [`Cluster`] objects that own them.
///
/// Cheap to clone, all clones share the same index.
#[derive(Clone, Default)]
pub struct ClusterIndex {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    owners: DashMap<String, BTreeSet<OwnerKey>>,
    keys: DashMap<OwnerKey, Indexed>,
    // Bumped on every relist, entries not seen since are pruned on InitDone
    epoch: AtomicU64,
}

struct Indexed {
    key: String,
    epoch: u64,
}

/// Index key of a cluster, the management cluster it reports in its status
pub fn index_key(cluster: &Cluster) -> Option<String> {
    cluster
        .status
        .as_ref()
        .map(|status| status.downstream_cluster_name.clone())
        .filter(|name| !name.is_empty())
}

fn owner_key(cluster: &Cluster) -> OwnerKey {
    (cluster.namespace().unwrap_or_default(), cluster.name_any())
}

impl ClusterIndex {
    /// Keep the index in sync with a cluster watch stream
    pub fn apply_watcher_event(&self, event: &watcher::Event<Cluster>) {
        match event {
            watcher::Event::Apply(cluster) | watcher::Event::InitApply(cluster) => {
                self.upsert(cluster, self.inner.epoch.load(Ordering::Acquire))
            }
            watcher::Event::Delete(cluster) => self.remove(&owner_key(cluster)),
            watcher::Event::Init => {
                self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            }
            watcher::Event::InitDone => self.prune(),
        }
    }

    /// All clusters indexed under `key`, sorted by namespace and name
    pub fn get_by_index(&self, key: &str) -> Vec<ObjectRef<Cluster>> {
        self.inner
            .owners
            .get(key)
            .map(|owners| {
                owners
                    .iter()
                    .map(|(namespace, name)| ObjectRef::new(name).within(namespace))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The cluster to reconcile when `downstream` changes, if any.
    ///
    /// With several owners the first in namespace/name order is picked.
    pub fn owner_of(&self, downstream: &ManagementCluster) -> Option<ObjectRef<Cluster>> {
        let name = downstream.name_any();
        let owner = self.get_by_index(&name).into_iter().next();
        if owner.is_none() {
            debug!(cluster = name, "No owner indexed for management cluster");
        }
        owner
    }

    fn upsert(&self, cluster: &Cluster, epoch: u64) {
        let owner = owner_key(cluster);
        let Some(key) = index_key(cluster) else {
            self.remove(&owner);
            return;
        };

        let previous = self.inner.keys.insert(
            owner.clone(),
            Indexed {
                key: key.clone(),
                epoch,
            },
        );
        if let Some(previous) = previous.filter(|previous| previous.key != key) {
            self.unlink(&previous.key, &owner);
        }

        self.inner.owners.entry(key).or_default().insert(owner);
    }

    fn remove(&self, owner: &OwnerKey) {
        if let Some((_, indexed)) = self.inner.keys.remove(owner) {
            self.unlink(&indexed.key, owner);
        }
    }

    fn unlink(&self, key: &str, owner: &OwnerKey) {
        if let Some(mut owners) = self.inner.owners.get_mut(key) {
            owners.remove(owner);
        }
        self.inner
            .owners
            .remove_if(key, |_, owners| owners.is_empty());
    }

    fn prune(&self) {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let stale: Vec<OwnerKey> = self
            .inner
            .keys
            .iter()
            .filter(|entry| entry.epoch < epoch)
            .map(|entry| entry.key().clone())
            .collect();

        for owner in &stale {
            self.remove(owner);
        }
        if !stale.is_empty() {
            debug!(pruned = stale.len(), "Dropped clusters gone during relist");
        }
    }
}
