use crate::{
    identity::{Kind, ObjectIdentity},
    jaeger::Jaeger,
    ownership::OwnerTag,
    Result,
};
use async_trait::async_trait;
use kube::api::DynamicObject;

/// Access to the managed objects in the cluster.
///
/// Writes are compare-and-swap: `update` fails with [`crate::Error::Conflict`]
/// when the stored version is not `expected_version` anymore, `create` fails
/// the same way when the identity already exists. `delete` fails with
/// [`crate::Error::NotFound`] when the object is already gone.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<DynamicObject>>;
    async fn create(&self, kind: Kind, obj: &DynamicObject) -> Result<DynamicObject>;
    async fn update(&self, kind: Kind, obj: &DynamicObject, expected_version: &str) -> Result<DynamicObject>;
    async fn delete(&self, id: &ObjectIdentity) -> Result<()>;
    /// Every object of `kind`, in any namespace, carrying the owner's tag
    async fn list(&self, kind: Kind, owner: &OwnerTag) -> Result<Vec<DynamicObject>>;
}

/// Access to the Jaeger instances themselves
#[async_trait]
pub trait InstanceLoader: Send + Sync {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<Jaeger>>;
}
