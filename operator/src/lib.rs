use common::{ObjectIdentity, OwnerTag};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Conflict: {0} was modified since it was read")]
    Conflict(ObjectIdentity),

    #[error("OwnershipConflict: {identity} exists but is not owned by {owner}")]
    OwnershipConflict { identity: ObjectIdentity, owner: OwnerTag },

    #[error("ProviderError: {0}")]
    ProviderError(#[source] common::Error),

    #[error("StoreError on {identity}: {source}")]
    StoreError {
        identity: ObjectIdentity,
        #[source]
        source: common::Error,
    },

    #[error("ListError: listing {kind} owned by {owner} failed: {source}")]
    ListError {
        kind: common::Kind,
        owner: String,
        #[source]
        source: common::Error,
    },

    #[error("LoadError: loading Jaeger {instance} failed: {source}")]
    LoadError {
        instance: String,
        #[source]
        source: common::Error,
    },

    #[error("{}", orchestrator::describe(.0))]
    Incomplete(Box<orchestrator::PassReport>),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Stdio error {0}")]
    Stdio(#[source] std::io::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[must_use]
    pub fn metric_label(&self) -> String {
        match self {
            Error::Conflict(_) => "conflict",
            Error::OwnershipConflict { .. } => "ownershipconflict",
            Error::ProviderError(_) => "providererror",
            Error::StoreError { .. } => "storeerror",
            Error::ListError { .. } => "listerror",
            Error::LoadError { .. } => "loaderror",
            Error::Incomplete(report) => return report.metric_label(),
            Error::KubeError(_) => "kubeerror",
            Error::Stdio(_) => "stdio",
        }
        .to_string()
    }

    /// Whether re-running the whole pass is expected to succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Incomplete(report) => report.failures().all(Error::is_retryable),
            _ => false,
        }
    }

    /// Turns a store failure on one object into its reconcile error
    pub(crate) fn on_object(identity: &ObjectIdentity, source: common::Error) -> Self {
        if source.is_conflict() {
            Error::Conflict(identity.clone())
        } else {
            Error::StoreError {
                identity: identity.clone(),
                source,
            }
        }
    }
}

pub static OPERATOR: &str = "controller.jaegertracing.io";

/// Command line and environment configuration
pub mod config;

/// Cluster object store backed by the kube client
pub mod kubestore;
pub use kubestore::KubeStore;

/// Per-kind create/update/delete diff
pub mod reconciler;

/// One reconcile pass for one Jaeger instance
pub mod orchestrator;
pub use orchestrator::{Completion, Orchestrator, ReconcileRequest};

/// State machinery for kube, as exposeable to actix
pub mod manager;
pub use manager::Manager;

/// Metrics
mod metrics;
pub use metrics::Metrics;
