use crate::OPERATOR;
use async_trait::async_trait;
use common::{InstanceLoader, Jaeger, Kind, ObjectIdentity, ObjectStore, OwnerTag};
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    Client,
};
use std::fmt::Display;

/// Object store talking to the API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    /// Restricts listing to one namespace when the operator only watches one
    watch_namespace: Option<String>,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            watch_namespace: None,
        }
    }

    #[must_use]
    pub fn with_watch_namespace(mut self, namespace: Option<String>) -> Self {
        self.watch_namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    fn api(&self, kind: Kind, namespace: &str) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        if !kind.is_namespaced() {
            Api::all_with(self.client.clone(), &ar)
        } else if namespace.is_empty() {
            Api::default_namespaced_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        }
    }

    fn list_api(&self, kind: Kind) -> Api<DynamicObject> {
        match &self.watch_namespace {
            Some(ns) if kind.is_namespaced() => self.api(kind, ns),
            _ => Api::all_with(self.client.clone(), &kind.api_resource()),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR.to_string()),
            ..PostParams::default()
        }
    }
}

fn store_error(what: impl Display, e: kube::Error) -> common::Error {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => common::Error::NotFound(what.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => common::Error::Conflict(format!("{what}: {}", ae.message)),
        e => common::Error::KubeError(e),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, id: &ObjectIdentity) -> common::Result<Option<DynamicObject>> {
        self.api(id.kind, &id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(|e| store_error(id, e))
    }

    async fn create(&self, kind: Kind, obj: &DynamicObject) -> common::Result<DynamicObject> {
        let id = ObjectIdentity::of(kind, obj);
        self.api(kind, &id.namespace)
            .create(&Self::post_params(), obj)
            .await
            .map_err(|e| store_error(&id, e))
    }

    async fn update(&self, kind: Kind, obj: &DynamicObject, expected_version: &str) -> common::Result<DynamicObject> {
        let id = ObjectIdentity::of(kind, obj);
        let mut obj = obj.clone();
        obj.metadata.resource_version = Some(expected_version.to_string());
        self.api(kind, &id.namespace)
            .replace(&id.name, &Self::post_params(), &obj)
            .await
            .map_err(|e| store_error(&id, e))
    }

    async fn delete(&self, id: &ObjectIdentity) -> common::Result<()> {
        self.api(id.kind, &id.namespace)
            .delete(&id.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| store_error(id, e))
    }

    async fn list(&self, kind: Kind, owner: &OwnerTag) -> common::Result<Vec<DynamicObject>> {
        let list = self
            .list_api(kind)
            .list(&ListParams::default().labels(&owner.selector()))
            .await
            .map_err(|e| store_error(format!("{kind} list"), e))?;
        Ok(list
            .items
            .into_iter()
            .map(|mut obj| {
                // items of a list do not carry their type
                obj.types.get_or_insert_with(|| kind.type_meta());
                obj
            })
            .filter(|obj| owner.owns(obj))
            .collect())
    }
}

#[async_trait]
impl InstanceLoader for KubeStore {
    async fn load(&self, namespace: &str, name: &str) -> common::Result<Option<Jaeger>> {
        let api: Api<Jaeger> = if namespace.is_empty() {
            Api::default_namespaced(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        };
        api.get_opt(name)
            .await
            .map_err(|e| store_error(format!("Jaeger {namespace}/{name}"), e))
    }
}
