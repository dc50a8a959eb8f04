use std::io;

use controllers::SyncError;
use kube::runtime::reflector::store::WriterDropped;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Cluster sync error: {0}")]
    SyncError(#[from] SyncError),

    #[error("Cache never became ready: {0}")]
    CacheError(#[from] WriterDropped),

    #[error("Metrics registration error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("CA certificate read error: {0}")]
    CertificateRead(#[from] io::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        format!("{self:?}").to_lowercase()
    }
}

/// Expose all controller components used by main
pub mod controller;
pub use crate::controller::*;
pub mod api;
pub mod controllers;
pub mod naming;

/// Command line and environment configuration
pub mod settings;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[cfg(test)]
pub mod fixtures;
