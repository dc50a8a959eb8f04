use std::time::Duration;

use clap::Parser;
use rand::distr::{Alphanumeric, SampleString as _};

#[derive(Parser, Debug, Clone)]
#[command(name = "controller", version, about, long_about = None)]
pub struct Settings {
    /// Print the rancher.cattle.io Cluster CRD and exit
    #[arg(long)]
    pub crd: bool,

    /// Public URL of the rancher server, used in issued kubeconfigs
    #[arg(long, env = "RANCHER_SERVER_URL", default_value = "https://localhost")]
    pub server_url: String,

    /// PEM file with the CA of the rancher server
    #[arg(long, env = "RANCHER_CA_CERT")]
    pub ca_cert: Option<String>,

    /// Key for kubeconfig tokens minted before their secret is cached.
    /// A random key is drawn at startup when unset.
    #[arg(long, env = "KUBECONFIG_TOKEN_KEY", hide_env_values = true)]
    pub token_key: Option<String>,

    /// Address of the metrics and health endpoint
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8443")]
    pub bind_address: String,

    #[arg(long, env = "ERROR_REQUEUE_SECONDS", default_value_t = 300)]
    pub error_requeue_seconds: u64,

    /// Maximum concurrent reconciles, 0 is unbounded
    #[arg(long = "concurrency", env = "RECONCILE_CONCURRENCY", default_value_t = 0)]
    pub concurrency: u16,
}

impl Settings {
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    pub fn token_key(&self) -> String {
        self.token_key
            .clone()
            .unwrap_or_else(|| Alphanumeric.sample_string(&mut rand::rng(), 64))
    }
}
