use crate::{
    identity::{Kind, ManagedObject},
    Result,
};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service, ServiceAccount},
    networking::v1::Ingress,
};
use kube::Resource;
use serde::Serialize;
use std::collections::BTreeMap;

/// Desired state computed for one reconcile pass: the complete list of
/// objects per kind. A kind absent from the bundle means no object of that
/// kind should exist for the owner.
#[derive(Clone, Debug, Default)]
pub struct DesiredBundle {
    objects: BTreeMap<Kind, Vec<ManagedObject>>,
}

impl DesiredBundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object, replacing a previous one with the same identity
    pub fn insert(&mut self, obj: ManagedObject) {
        let list = self.objects.entry(obj.kind).or_default();
        let id = obj.identity();
        match list.iter_mut().find(|o| o.identity() == id) {
            Some(existing) => *existing = obj,
            None => list.push(obj),
        }
    }

    pub fn with_objects<'a, K>(mut self, items: impl IntoIterator<Item = &'a K>) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize + 'a,
    {
        for item in items {
            self.insert(ManagedObject::from_resource(item)?);
        }
        Ok(self)
    }

    pub fn with_config_maps(self, items: &[ConfigMap]) -> Result<Self> {
        self.with_objects(items)
    }

    pub fn with_deployments(self, items: &[Deployment]) -> Result<Self> {
        self.with_objects(items)
    }

    pub fn with_services(self, items: &[Service]) -> Result<Self> {
        self.with_objects(items)
    }

    pub fn with_accounts(self, items: &[ServiceAccount]) -> Result<Self> {
        self.with_objects(items)
    }

    pub fn with_ingresses(self, items: &[Ingress]) -> Result<Self> {
        self.with_objects(items)
    }

    #[must_use]
    pub fn objects(&self, kind: Kind) -> &[ManagedObject] {
        self.objects.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
