use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("K8s error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict on {0}")]
    Conflict(String),

    #[error("Unsupported kind {0}")]
    UnsupportedKind(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Strategy error: {0}")]
    Strategy(String),
}
impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::SerializationError(_) => "serialization",
            Error::KubeError(_) => "kube",
            Error::NotFound(_) => "notfound",
            Error::Conflict(_) => "conflict",
            Error::UnsupportedKind(_) => "unsupportedkind",
            Error::InvalidObject(_) => "invalidobject",
            Error::Strategy(_) => "strategy",
        }
        .to_string()
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod bundle;
pub mod identity;
pub mod jaeger;
pub mod memstore;
pub mod ownership;
pub mod payload;
pub mod store;
pub mod strategy;

pub use bundle::DesiredBundle;
pub use identity::{Kind, ManagedObject, ObjectIdentity};
pub use jaeger::{Jaeger, JaegerSpec};
pub use ownership::OwnerTag;
pub use store::{InstanceLoader, ObjectStore};
pub use strategy::StrategyProvider;

pub static OPERATOR: &str = "jaeger-operator";
