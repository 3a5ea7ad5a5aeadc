use crate::{
    identity::{Kind, ObjectIdentity},
    jaeger::Jaeger,
    ownership::OwnerTag,
    store::{InstanceLoader, ObjectStore},
    Error, Result,
};
use async_trait::async_trait;
use kube::{api::DynamicObject, ResourceExt};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

/// In-memory cluster with the same compare-and-swap semantics as the API
/// server. Mostly useful for tests.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<ObjectIdentity, DynamicObject>>,
    instances: RwLock<BTreeMap<(String, String), Jaeger>>,
    version: AtomicU64,
    mutations: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub async fn add_instance(&self, jaeger: Jaeger) {
        let key = (jaeger.namespace().unwrap_or_default(), jaeger.name_any());
        self.instances.write().await.insert(key, jaeger);
    }

    pub async fn remove_instance(&self, namespace: &str, name: &str) {
        self.instances
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Seeds an object as if another actor created it; not counted as a mutation
    pub async fn seed(&self, kind: Kind, mut obj: DynamicObject) -> DynamicObject {
        obj.metadata.resource_version = Some(self.next_version());
        if obj.types.is_none() {
            obj.types = Some(kind.type_meta());
        }
        self.objects
            .write()
            .await
            .insert(ObjectIdentity::of(kind, &obj), obj.clone());
        obj
    }

    /// Bumps the stored version, as a concurrent writer would
    pub async fn touch(&self, id: &ObjectIdentity) {
        let version = self.next_version();
        if let Some(obj) = self.objects.write().await.get_mut(id) {
            obj.metadata.resource_version = Some(version);
        }
    }

    pub async fn snapshot(&self) -> BTreeMap<ObjectIdentity, DynamicObject> {
        self.objects.read().await.clone()
    }

    /// Number of successful create, update and delete calls so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<DynamicObject>> {
        Ok(self.objects.read().await.get(id).cloned())
    }

    async fn create(&self, kind: Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let id = ObjectIdentity::of(kind, obj);
        let mut objects = self.objects.write().await;
        if objects.contains_key(&id) {
            tracing::debug!("create of {id} rejected: already exists");
            return Err(Error::Conflict(format!("{id} already exists")));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(id, stored.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(&self, kind: Kind, obj: &DynamicObject, expected_version: &str) -> Result<DynamicObject> {
        let id = ObjectIdentity::of(kind, obj);
        let mut objects = self.objects.write().await;
        let current = objects.get(&id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        if current.metadata.resource_version.as_deref() != Some(expected_version) {
            tracing::debug!(
                "update of {id} rejected: expected version {expected_version}, found {:?}",
                current.metadata.resource_version
            );
            return Err(Error::Conflict(format!("{id} was modified since version {expected_version}")));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(id, stored.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, id: &ObjectIdentity) -> Result<()> {
        match self.objects.write().await.remove(id) {
            Some(_) => {
                self.mutations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    async fn list(&self, kind: Kind, owner: &OwnerTag) -> Result<Vec<DynamicObject>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(id, obj)| id.kind == kind && owner.owns(obj))
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

#[async_trait]
impl InstanceLoader for MemoryStore {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<Jaeger>> {
        Ok(self
            .instances
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn object(ns: &str, name: &str) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..ObjectMeta::default()
            },
            data: serde_json::json!({"data": {}}),
        }
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = MemoryStore::new();
        let created = store.create(Kind::ConfigMap, &object("ns", "X")).await.unwrap();
        let version = created.metadata.resource_version.clone().unwrap();
        let updated = store.update(Kind::ConfigMap, &created, &version).await.unwrap();
        assert_ne!(updated.metadata.resource_version, created.metadata.resource_version);
        let stale = store.update(Kind::ConfigMap, &created, &version).await;
        assert!(matches!(stale, Err(Error::Conflict(_))));
        assert_eq!(store.mutations(), 2);
    }

    #[tokio::test]
    async fn test_create_existing_conflicts_and_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        store.create(Kind::ConfigMap, &object("ns", "X")).await.unwrap();
        assert!(store.create(Kind::ConfigMap, &object("ns", "X")).await.unwrap_err().is_conflict());
        let id = ObjectIdentity::new(Kind::ConfigMap, "ns", "X");
        store.delete(&id).await.unwrap();
        assert!(store.delete(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_only_returns_owned_objects_of_kind() {
        let store = MemoryStore::new();
        let owner = OwnerTag::for_instance(&Jaeger::named("ns", "simplest"));
        store.seed(Kind::ConfigMap, owner.stamp(Kind::ConfigMap, object("ns", "mine"))).await;
        store.seed(Kind::Secret, owner.stamp(Kind::Secret, object("ns", "secret"))).await;
        store.seed(Kind::ConfigMap, object("ns", "foreign")).await;
        let listed = store.list(Kind::ConfigMap, &owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name_any(), "mine");
    }
}
