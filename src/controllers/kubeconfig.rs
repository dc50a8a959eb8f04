use std::collections::BTreeMap;

use base64::prelude::*;
use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{
    api::ObjectMeta,
    runtime::reflector::{ObjectRef, Store},
    ResourceExt as _,
};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::api::cluster::{Cluster, ClusterStatus};

use super::IssueResult;

pub static KUBECONFIG_LABEL: &str = "rancher.cattle.io/kubeconfig";
pub static KUBECONFIG_KEY: &str = "value";
pub static TOKEN_KEY: &str = "token";

const TOKEN_LENGTH: usize = 64;
const SHA256_BLOCK: usize = 64;

/// Mints the credential secret for a ready cluster
#[cfg_attr(test, automock)]
pub trait CredentialIssuer: Send + Sync {
    /// `Ok(None)` while the cluster is not ready or has no management cluster.
    fn issue(&self, cluster: &Cluster, status: &ClusterStatus) -> IssueResult<Option<Secret>>;
}

/// Issues kubeconfig secrets pointing at the rancher proxy endpoint of the
/// management cluster.
///
/// A token found in the cached secret is kept. Otherwise the token is
/// HMAC-SHA256 of the cluster identity under `token_key`, so issuing twice
/// before the secret reaches the cache yields the same secret.
pub struct KubeconfigManager {
    server_url: String,
    ca_data: Option<String>,
    token_key: Vec<u8>,
    secrets: Store<Secret>,
}

impl KubeconfigManager {
    pub fn new(
        server_url: &str,
        ca_cert: Option<&str>,
        token_key: &str,
        secrets: Store<Secret>,
    ) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            ca_data: ca_cert.map(|pem| BASE64_STANDARD.encode(pem)),
            token_key: token_key.as_bytes().to_vec(),
            secrets,
        }
    }

    fn token(&self, namespace: &str, name: &str, downstream: &str) -> String {
        self.secrets
            .get(&ObjectRef::new(name).within(namespace))
            .and_then(|secret| secret.data.as_ref()?.get(TOKEN_KEY).cloned())
            .and_then(|token| String::from_utf8(token.0).ok())
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| derive_token(&self.token_key, &[namespace, name, downstream]))
    }
}

/// Keyed digest of length-prefixed `parts`, hex encoded
fn derive_token(key: &[u8], parts: &[&str]) -> String {
    let mut message = Vec::new();
    for part in parts {
        message.extend_from_slice(&part.len().to_be_bytes());
        message.extend_from_slice(part.as_bytes());
    }
    hex::encode(hmac_sha256(key, &message))
}

/// HMAC-SHA256 per RFC 2104
fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut block = [0u8; SHA256_BLOCK];
    if key.len() > SHA256_BLOCK {
        let hashed = Sha256::digest(key);
        block[..hashed.len()].copy_from_slice(&hashed);
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let inner = Sha256::new()
        .chain_update(block.map(|b| b ^ 0x36))
        .chain_update(message)
        .finalize();
    Sha256::new()
        .chain_update(block.map(|b| b ^ 0x5c))
        .chain_update(inner)
        .finalize()
        .to_vec()
}

pub fn secret_name(cluster: &Cluster) -> String {
    format!("{}-kubeconfig", cluster.name_any())
}

impl CredentialIssuer for KubeconfigManager {
    fn issue(&self, cluster: &Cluster, status: &ClusterStatus) -> IssueResult<Option<Secret>> {
        if !status.ready || status.downstream_cluster_name.is_empty() {
            return Ok(None);
        }

        let namespace = cluster.namespace().unwrap_or_default();
        let name = secret_name(cluster);
        let token = self.token(&namespace, &name, &status.downstream_cluster_name);
        let server = format!(
            "{}/k8s/clusters/{}",
            self.server_url, status.downstream_cluster_name
        );
        let kubeconfig = Kubeconfig::new(&cluster.name_any(), server, self.ca_data.clone(), &token);

        Ok(Some(Secret {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(namespace),
                labels: Some([(KUBECONFIG_LABEL.to_string(), "true".to_string())].into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (
                    KUBECONFIG_KEY.to_string(),
                    ByteString(serde_yaml::to_string(&kubeconfig)?.into_bytes()),
                ),
                (TOKEN_KEY.to_string(), ByteString(token.into_bytes())),
            ])),
            ..Default::default()
        }))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kubeconfig {
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<Named<KubeconfigCluster>>,
    users: Vec<Named<KubeconfigUser>>,
    contexts: Vec<Named<KubeconfigContext>>,
    #[serde(rename = "current-context")]
    current_context: String,
}

#[derive(Serialize)]
struct Named<T> {
    name: String,
    #[serde(flatten)]
    item: T,
}

#[derive(Serialize)]
struct KubeconfigCluster {
    cluster: ClusterEntry,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<String>,
}

#[derive(Serialize)]
struct KubeconfigUser {
    user: UserEntry,
}

#[derive(Serialize)]
struct UserEntry {
    token: String,
}

#[derive(Serialize)]
struct KubeconfigContext {
    context: ContextEntry,
}

#[derive(Serialize)]
struct ContextEntry {
    cluster: String,
    user: String,
}

impl Kubeconfig {
    fn new(name: &str, server: String, ca_data: Option<String>, token: &str) -> Self {
        Self {
            api_version: "v1",
            kind: "Config",
            clusters: vec![Named {
                name: name.to_string(),
                item: KubeconfigCluster {
                    cluster: ClusterEntry {
                        server,
                        certificate_authority_data: ca_data,
                    },
                },
            }],
            users: vec![Named {
                name: "user".to_string(),
                item: KubeconfigUser {
                    user: UserEntry {
                        token: token.to_string(),
                    },
                },
            }],
            contexts: vec![Named {
                name: "default".to_string(),
                item: KubeconfigContext {
                    context: ContextEntry {
                        cluster: name.to_string(),
                        user: "user".to_string(),
                    },
                },
            }],
            current_context: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::runtime::{reflector, watcher};
    use serde_yaml::Value;

    use super::*;
    use crate::fixtures;

    fn ready_status() -> ClusterStatus {
        ClusterStatus {
            ready: true,
            downstream_cluster_name: "c-abc".into(),
            ..Default::default()
        }
    }

    fn data(secret: &Secret, key: &str) -> String {
        let bytes = secret.data.as_ref().unwrap()[key].0.clone();
        String::from_utf8(bytes).unwrap()
    }

    fn kubeconfig(secret: &Secret) -> Value {
        serde_yaml::from_str(&data(secret, KUBECONFIG_KEY)).unwrap()
    }

    #[test]
    fn nothing_issued_before_ready() {
        let (store, _writer) = reflector::store();
        let manager = KubeconfigManager::new("https://rancher.example.com", None, "key", store);
        let cluster = fixtures::rke_cluster("fleet-default", "a");

        let pending = ClusterStatus {
            ready: false,
            ..ready_status()
        };
        assert!(manager.issue(&cluster, &pending).unwrap().is_none());

        let unnamed = ClusterStatus {
            downstream_cluster_name: String::new(),
            ..ready_status()
        };
        assert!(manager.issue(&cluster, &unnamed).unwrap().is_none());
    }

    #[test]
    fn issued_secret_points_at_proxy() {
        let (store, _writer) = reflector::store();
        let manager = KubeconfigManager::new("https://rancher.example.com/", None, "key", store);
        let cluster = fixtures::rke_cluster("fleet-default", "a");

        let secret = manager.issue(&cluster, &ready_status()).unwrap().unwrap();

        assert_eq!(secret.name_any(), "a-kubeconfig");
        assert_eq!(secret.namespace().as_deref(), Some("fleet-default"));
        assert_eq!(secret.labels()[KUBECONFIG_LABEL], "true");

        let token = data(&secret, TOKEN_KEY);
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        let config = kubeconfig(&secret);
        assert_eq!(config["kind"], "Config");
        assert_eq!(config["current-context"], "default");
        assert_eq!(
            config["clusters"][0]["cluster"]["server"],
            "https://rancher.example.com/k8s/clusters/c-abc"
        );
        assert!(config["clusters"][0]["cluster"]
            .get("certificate-authority-data")
            .is_none());
        assert_eq!(config["users"][0]["user"]["token"].as_str(), Some(token.as_str()));
        assert_eq!(config["contexts"][0]["context"]["cluster"], "a");
    }

    #[test]
    fn ca_is_embedded() {
        let (store, _writer) = reflector::store();
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        let manager = KubeconfigManager::new("https://rancher.example.com", Some(pem), "key", store);
        let cluster = fixtures::rke_cluster("fleet-default", "a");

        let secret = manager.issue(&cluster, &ready_status()).unwrap().unwrap();
        let config = kubeconfig(&secret);
        let ca = config["clusters"][0]["cluster"]["certificate-authority-data"]
            .as_str()
            .unwrap();

        assert_eq!(BASE64_STANDARD.decode(ca).unwrap(), pem.as_bytes());
    }

    #[test]
    fn existing_token_is_reused() {
        let (store, mut writer) = reflector::store();
        writer.apply_watcher_event(&watcher::Event::Apply(Secret {
            metadata: ObjectMeta {
                name: Some("a-kubeconfig".into()),
                namespace: Some("fleet-default".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                TOKEN_KEY.to_string(),
                ByteString(b"existing-token".to_vec()),
            )])),
            ..Default::default()
        }));
        let manager = KubeconfigManager::new("https://rancher.example.com", None, "key", store);
        let cluster = fixtures::rke_cluster("fleet-default", "a");

        let first = manager.issue(&cluster, &ready_status()).unwrap().unwrap();
        let second = manager.issue(&cluster, &ready_status()).unwrap().unwrap();

        assert_eq!(data(&first, TOKEN_KEY), "existing-token");
        assert_eq!(first, second);
    }

    #[test]
    fn token_is_stable_before_the_secret_is_cached() {
        let (store, _writer) = reflector::store();
        let manager = KubeconfigManager::new("https://rancher.example.com", None, "key", store);
        let cluster = fixtures::rke_cluster("fleet-default", "a");

        let first = manager.issue(&cluster, &ready_status()).unwrap().unwrap();
        let second = manager.issue(&cluster, &ready_status()).unwrap().unwrap();
        assert_eq!(first, second);

        let other = fixtures::rke_cluster("fleet-default", "b");
        let other = manager.issue(&other, &ready_status()).unwrap().unwrap();
        assert_ne!(data(&first, TOKEN_KEY), data(&other, TOKEN_KEY));
    }

    #[test]
    fn token_depends_on_the_key() {
        let (store, _writer) = reflector::store();
        let cluster = fixtures::rke_cluster("fleet-default", "a");
        let one = KubeconfigManager::new("https://rancher.example.com", None, "one", store.clone());
        let two = KubeconfigManager::new("https://rancher.example.com", None, "two", store);

        let one = one.issue(&cluster, &ready_status()).unwrap().unwrap();
        let two = two.issue(&cluster, &ready_status()).unwrap().unwrap();
        assert_ne!(data(&one, TOKEN_KEY), data(&two, TOKEN_KEY));
    }

    #[test]
    fn hmac_matches_rfc_4231() {
        assert_eq!(
            hex::encode(hmac_sha256(b"Jefe", b"what do ya want for nothing?")),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        // keys longer than a block are hashed first
        assert_eq!(
            hex::encode(hmac_sha256(
                &[0xaa; 131],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            )),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }
}
