use crate::{Error, Result};
use common::{payload, Kind, ManagedObject, ObjectIdentity, ObjectStore, OwnerTag};
use std::collections::BTreeSet;
use tracing::instrument;

/// What a pass did to one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
    Deleted,
}

impl Applied {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Created => "created",
            Applied::Updated => "updated",
            Applied::Unchanged => "unchanged",
            Applied::Deleted => "deleted",
        }
    }
}

/// Outcome of every object of one kind. Failures do not stop the other
/// objects of the kind from being processed.
#[derive(Debug)]
pub struct KindReport {
    pub kind: Kind,
    pub created: Vec<ObjectIdentity>,
    pub updated: Vec<ObjectIdentity>,
    pub unchanged: Vec<ObjectIdentity>,
    pub deleted: Vec<ObjectIdentity>,
    pub failures: Vec<Error>,
}

impl KindReport {
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            deleted: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, id: ObjectIdentity, applied: Applied) {
        match applied {
            Applied::Created => self.created.push(id),
            Applied::Updated => self.updated.push(id),
            Applied::Unchanged => self.unchanged.push(id),
            Applied::Deleted => self.deleted.push(id),
        }
    }

    #[must_use]
    pub fn mutations(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Synchronizes the objects of one kind owned by one instance with the
/// desired list for that kind.
pub struct KindReconciler<'a> {
    store: &'a dyn ObjectStore,
    owner: &'a OwnerTag,
    kind: Kind,
}

impl<'a> KindReconciler<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, owner: &'a OwnerTag, kind: Kind) -> Self {
        Self { store, owner, kind }
    }

    #[instrument(skip_all, fields(kind = %self.kind, owner = %self.owner))]
    pub async fn reconcile(&self, desired: &[ManagedObject]) -> KindReport {
        let mut report = KindReport::new(self.kind);
        let mut wanted = BTreeSet::new();
        for d in desired {
            let mut obj = self.owner.stamp(self.kind, d.object.clone());
            let id = ObjectIdentity::of(self.kind, &obj);
            wanted.insert(id.clone());
            if let Err(e) = payload::seal(&mut obj) {
                report.failures.push(Error::on_object(&id, e));
                continue;
            }
            match self.sync(&id, obj).await {
                Ok(applied) => report.record(id, applied),
                Err(e) => {
                    tracing::warn!("{e}");
                    report.failures.push(e);
                }
            }
        }
        self.prune(&wanted, &mut report).await;
        tracing::debug!(
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Reconciled {}",
            self.kind
        );
        report
    }

    async fn sync(&self, id: &ObjectIdentity, desired: kube::api::DynamicObject) -> Result<Applied> {
        let current = self.store.get(id).await.map_err(|e| Error::on_object(id, e))?;
        match current {
            None => {
                self.store
                    .create(self.kind, &desired)
                    .await
                    .map_err(|e| Error::on_object(id, e))?;
                tracing::info!("Created {id} for {}", self.owner);
                Ok(Applied::Created)
            }
            Some(current) if !self.owner.owns(&current) => Err(Error::OwnershipConflict {
                identity: id.clone(),
                owner: self.owner.clone(),
            }),
            Some(current) if payload::is_up_to_date(&current, &desired) => Ok(Applied::Unchanged),
            Some(current) => {
                let version = current.metadata.resource_version.clone().unwrap_or_default();
                let next = payload::apply(&current, &desired);
                self.store
                    .update(self.kind, &next, &version)
                    .await
                    .map_err(|e| Error::on_object(id, e))?;
                tracing::info!("Updated {id} for {}", self.owner);
                Ok(Applied::Updated)
            }
        }
    }

    async fn prune(&self, wanted: &BTreeSet<ObjectIdentity>, report: &mut KindReport) {
        let actual = match self.store.list(self.kind, self.owner).await {
            Ok(actual) => actual,
            Err(source) => {
                report.failures.push(Error::ListError {
                    kind: self.kind,
                    owner: self.owner.to_string(),
                    source,
                });
                return;
            }
        };
        for obj in actual {
            let id = ObjectIdentity::of(self.kind, &obj);
            if wanted.contains(&id) || !self.owner.owns(&obj) {
                continue;
            }
            match self.store.delete(&id).await {
                Ok(()) => {
                    tracing::info!("Deleted {id} for {}", self.owner);
                    report.record(id, Applied::Deleted);
                }
                Err(e) if e.is_not_found() => tracing::debug!("{id} already gone"),
                Err(e) => report.failures.push(Error::on_object(&id, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{memstore::MemoryStore, Jaeger};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::{api::DynamicObject, api::ObjectMeta};

    fn owner(ns: &str, name: &str) -> OwnerTag {
        let mut jaeger = Jaeger::named(ns, name);
        jaeger.metadata.uid = Some(format!("uid-{ns}-{name}"));
        OwnerTag::for_instance(&jaeger)
    }

    fn config_map(ns: &str, name: &str, key: &str, value: &str) -> ManagedObject {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()).filter(|n| !n.is_empty()),
                annotations: Some([(key.to_string(), value.to_string())].into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };
        ManagedObject::from_resource(&cm).unwrap()
    }

    #[tokio::test]
    async fn test_create_update_delete_cycle() {
        let store = MemoryStore::new();
        let owner = owner("ns", "simplest");
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);

        let report = rec.reconcile(&[config_map("ns", "X", "key", "value")]).await;
        assert!(report.is_ok());
        assert_eq!(report.created, vec![ObjectIdentity::new(Kind::ConfigMap, "ns", "X")]);

        let report = rec.reconcile(&[config_map("ns", "X", "key", "new-value")]).await;
        assert_eq!(report.updated.len(), 1);
        let stored = store
            .get(&ObjectIdentity::new(Kind::ConfigMap, "ns", "X"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.annotations.unwrap()["key"], "new-value");

        let report = rec.reconcile(&[]).await;
        assert_eq!(report.deleted.len(), 1);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let store = MemoryStore::new();
        let owner = owner("ns", "simplest");
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);
        let desired = [config_map("ns", "X", "key", "value"), config_map("ns", "Y", "k", "v")];
        rec.reconcile(&desired).await;
        let before = store.mutations();
        let report = rec.reconcile(&desired).await;
        assert_eq!(report.mutations(), 0);
        assert_eq!(report.unchanged.len(), 2);
        assert_eq!(store.mutations(), before);
    }

    #[tokio::test]
    async fn test_foreign_object_is_reported_and_untouched() {
        let store = MemoryStore::new();
        let foreign = owner("ns", "other");
        let seeded = store
            .seed(Kind::ConfigMap, foreign.stamp(Kind::ConfigMap, config_map("ns", "X", "key", "theirs").object))
            .await;
        let owner = owner("ns", "simplest");
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);

        let report = rec.reconcile(&[config_map("ns", "X", "key", "mine")]).await;
        assert!(matches!(
            report.failures.as_slice(),
            [Error::OwnershipConflict { identity, .. }] if identity.name == "X"
        ));
        let id = ObjectIdentity::new(Kind::ConfigMap, "ns", "X");
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.resource_version, seeded.metadata.resource_version);

        // not deleted either when no longer desired
        let report = rec.reconcile(&[]).await;
        assert!(report.is_ok());
        assert!(store.get(&id).await.unwrap().is_some());
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_rest() {
        let store = MemoryStore::new();
        let foreign = owner("ns", "other");
        store
            .seed(Kind::ConfigMap, foreign.stamp(Kind::ConfigMap, config_map("ns", "A", "k", "v").object))
            .await;
        let owner = owner("ns", "simplest");
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);
        let report = rec
            .reconcile(&[config_map("ns", "A", "k", "v"), config_map("ns", "B", "k", "v")])
            .await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.created, vec![ObjectIdentity::new(Kind::ConfigMap, "ns", "B")]);
    }

    /// Store where another writer bumps the version right after every read
    struct Racing(MemoryStore);

    #[async_trait]
    impl ObjectStore for Racing {
        async fn get(&self, id: &ObjectIdentity) -> common::Result<Option<DynamicObject>> {
            let found = self.0.get(id).await?;
            self.0.touch(id).await;
            Ok(found)
        }
        async fn create(&self, kind: Kind, obj: &DynamicObject) -> common::Result<DynamicObject> {
            self.0.create(kind, obj).await
        }
        async fn update(&self, kind: Kind, obj: &DynamicObject, version: &str) -> common::Result<DynamicObject> {
            self.0.update(kind, obj, version).await
        }
        async fn delete(&self, id: &ObjectIdentity) -> common::Result<()> {
            self.0.delete(id).await
        }
        async fn list(&self, kind: Kind, owner: &OwnerTag) -> common::Result<Vec<DynamicObject>> {
            self.0.list(kind, owner).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_modification_is_a_conflict() {
        let owner = owner("ns", "simplest");
        let inner = MemoryStore::new();
        inner
            .seed(Kind::ConfigMap, owner.stamp(Kind::ConfigMap, config_map("ns", "X", "key", "value").object))
            .await;
        let store = Racing(inner);
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);
        let report = rec.reconcile(&[config_map("ns", "X", "key", "new-value")]).await;
        assert!(matches!(report.failures.as_slice(), [Error::Conflict(_)]));
        assert!(report.failures[0].is_retryable());
        assert_eq!(store.0.mutations(), 0);
    }

    /// Store where another actor deletes an object right before we do
    struct Vanishing(MemoryStore);

    #[async_trait]
    impl ObjectStore for Vanishing {
        async fn get(&self, id: &ObjectIdentity) -> common::Result<Option<DynamicObject>> {
            self.0.get(id).await
        }
        async fn create(&self, kind: Kind, obj: &DynamicObject) -> common::Result<DynamicObject> {
            self.0.create(kind, obj).await
        }
        async fn update(&self, kind: Kind, obj: &DynamicObject, version: &str) -> common::Result<DynamicObject> {
            self.0.update(kind, obj, version).await
        }
        async fn delete(&self, id: &ObjectIdentity) -> common::Result<()> {
            self.0.delete(id).await?;
            self.0.delete(id).await
        }
        async fn list(&self, kind: Kind, owner: &OwnerTag) -> common::Result<Vec<DynamicObject>> {
            self.0.list(kind, owner).await
        }
    }

    #[tokio::test]
    async fn test_object_gone_before_delete_is_satisfied() {
        let owner = owner("ns", "simplest");
        let inner = MemoryStore::new();
        inner
            .seed(Kind::ConfigMap, owner.stamp(Kind::ConfigMap, config_map("ns", "X", "key", "value").object))
            .await;
        let store = Vanishing(inner);
        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);

        let report = rec.reconcile(&[]).await;
        assert!(report.is_ok());
        assert!(report.deleted.is_empty());
        assert!(store.0.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_and_cluster_metadata_survive_update() {
        let store = MemoryStore::new();
        let owner = owner("ns", "simplest");
        let mut existing = owner.stamp(Kind::ConfigMap, config_map("ns", "X", "key", "value").object);
        existing.metadata.finalizers = Some(vec!["example.com/keep".to_string()]);
        existing.data["status"] = serde_json::json!({"observed": true});
        store.seed(Kind::ConfigMap, existing).await;

        let rec = KindReconciler::new(&store, &owner, Kind::ConfigMap);
        rec.reconcile(&[config_map("ns", "X", "key", "new-value")]).await;
        let stored = store
            .get(&ObjectIdentity::new(Kind::ConfigMap, "ns", "X"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.finalizers, Some(vec!["example.com/keep".to_string()]));
        assert_eq!(stored.data["status"]["observed"], true);
    }
}
