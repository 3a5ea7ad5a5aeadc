use crate::{Error, Result};
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    autoscaling::v2::HorizontalPodAutoscaler,
    batch::v1::CronJob,
    core::v1::{ConfigMap, Secret, Service, ServiceAccount},
    networking::v1::Ingress,
    rbac::v1::ClusterRoleBinding,
};
use kube::{
    api::{ApiResource, DynamicObject, TypeMeta},
    Resource,
};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// Kinds of cluster objects managed on behalf of a Jaeger instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    ServiceAccount,
    ClusterRoleBinding,
    ConfigMap,
    Secret,
    CronJob,
    DaemonSet,
    Deployment,
    Service,
    Ingress,
    HorizontalPodAutoscaler,
}

impl Kind {
    /// Every supported kind, in the order objects have to exist for the next
    /// ones to reference them.
    pub const ALL: [Kind; 10] = [
        Kind::ServiceAccount,
        Kind::ClusterRoleBinding,
        Kind::ConfigMap,
        Kind::Secret,
        Kind::CronJob,
        Kind::DaemonSet,
        Kind::Deployment,
        Kind::Service,
        Kind::Ingress,
        Kind::HorizontalPodAutoscaler,
    ];

    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        match self {
            Kind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            Kind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
            Kind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            Kind::Secret => ApiResource::erase::<Secret>(&()),
            Kind::CronJob => ApiResource::erase::<CronJob>(&()),
            Kind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
            Kind::Deployment => ApiResource::erase::<Deployment>(&()),
            Kind::Service => ApiResource::erase::<Service>(&()),
            Kind::Ingress => ApiResource::erase::<Ingress>(&()),
            Kind::HorizontalPodAutoscaler => ApiResource::erase::<HorizontalPodAutoscaler>(&()),
        }
    }

    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, Kind::ClusterRoleBinding)
    }

    #[must_use]
    pub fn type_meta(&self) -> TypeMeta {
        let ar = self.api_resource();
        TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ServiceAccount => "ServiceAccount",
            Kind::ClusterRoleBinding => "ClusterRoleBinding",
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::CronJob => "CronJob",
            Kind::DaemonSet => "DaemonSet",
            Kind::Deployment => "Deployment",
            Kind::Service => "Service",
            Kind::Ingress => "Ingress",
            Kind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedKind(s.to_string()))
    }
}

/// Unique key of a cluster object: two objects with the same name in two
/// namespaces are two distinct identities.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectIdentity {
    pub kind: Kind,
    /// Empty for cluster-scoped kinds
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn of(kind: Kind, obj: &DynamicObject) -> Self {
        Self::new(
            kind,
            obj.metadata.namespace.clone().unwrap_or_default(),
            obj.metadata.name.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// One desired or observed object of a supported kind
#[derive(Clone, Debug)]
pub struct ManagedObject {
    pub kind: Kind,
    pub object: DynamicObject,
}

impl ManagedObject {
    pub fn new(kind: Kind, mut object: DynamicObject) -> Result<Self> {
        if object.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::InvalidObject(format!("{kind} without a name")));
        }
        if object.types.is_none() {
            object.types = Some(kind.type_meta());
        }
        Ok(Self { kind, object })
    }

    /// Converts any typed k8s-openapi object of a supported kind
    pub fn from_resource<K>(resource: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let kind: Kind = K::kind(&()).parse()?;
        let object: DynamicObject = serde_json::from_value(serde_json::to_value(resource)?)?;
        Self::new(kind, object)
    }

    #[must_use]
    pub fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(self.kind, &self.object)
    }
}
