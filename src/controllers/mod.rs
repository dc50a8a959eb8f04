use kube::api::TypeMeta;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Defaulting(#[from] DefaultingError),

    #[error("{0}")]
    Generate(#[from] GenerateError),

    #[error("{0}")]
    Apply(#[from] ApplyError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum DefaultingError {
    #[error("Cluster update error: {0}")]
    Update(#[source] kube::Error),
}

pub type DefaultingResult<T> = std::result::Result<T, DefaultingError>;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Management cluster lookup error: {0}")]
    Lookup(#[source] kube::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Referenced config has no management cluster name")]
    EmptyReference,

    #[error("Referenced management cluster `{0}` not found")]
    ReferenceNotFound(String),

    #[error("Credential error: {0}")]
    Credential(#[from] IssueError),

    #[error("Cluster `{0}` is ready but no credential was issued")]
    MissingCredential(String),
}

pub type GenerateResult<T> = std::result::Result<T, GenerateError>;

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Kubeconfig encode error: {0}")]
    Encode(#[from] serde_yaml::Error),
}

pub type IssueResult<T> = std::result::Result<T, IssueError>;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Object of unknown kind {0:?}")]
    UnknownKind(Option<TypeMeta>),

    #[error("Object of kind {0} has no name")]
    MissingName(String),

    #[error("Apply error: {0}")]
    Apply(#[source] kube::Error),

    #[error("Prune error: {0}")]
    Prune(#[source] kube::Error),

    #[error("Status update error: {0}")]
    Status(#[source] kube::Error),
}

pub type ApplyResult<T> = std::result::Result<T, ApplyError>;

pub mod apply;
pub mod cluster;
pub mod controller;
pub mod generate;
pub mod index;
pub mod kubeconfig;
pub mod status;
