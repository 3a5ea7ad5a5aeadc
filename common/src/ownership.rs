use crate::{identity::Kind, jaeger::Jaeger, OPERATOR};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{api::DynamicObject, Resource, ResourceExt};
use std::fmt;

pub static LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub static LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub static LABEL_OWNER_NAMESPACE: &str = "jaegertracing.io/owner-namespace";

/// Links managed objects to the one Jaeger instance they belong to.
///
/// The tag is carried as labels on every kind, so it can be queried with a
/// label selector, and as a controller owner reference where the platform
/// allows one (namespaced objects in the owner's namespace) so that deleting
/// the instance garbage-collects its objects.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnerTag {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    owner_ref: Option<OwnerReference>,
}

impl OwnerTag {
    #[must_use]
    pub fn for_instance(jaeger: &Jaeger) -> Self {
        Self {
            name: jaeger.name_any(),
            namespace: jaeger.namespace().unwrap_or_default(),
            uid: jaeger.uid(),
            owner_ref: jaeger.controller_owner_ref(&()),
        }
    }

    #[must_use]
    pub fn labels(&self) -> [(&'static str, String); 3] {
        [
            (LABEL_MANAGED_BY, OPERATOR.to_string()),
            (LABEL_INSTANCE, self.name.clone()),
            (LABEL_OWNER_NAMESPACE, self.namespace.clone()),
        ]
    }

    /// Label selector matching every object stamped by this owner
    #[must_use]
    pub fn selector(&self) -> String {
        self.labels()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Stamps ownership onto a desired object of the given kind
    #[must_use]
    pub fn stamp(&self, kind: Kind, mut obj: DynamicObject) -> DynamicObject {
        if kind.is_namespaced() {
            if obj.metadata.namespace.as_deref().unwrap_or_default().is_empty() && !self.namespace.is_empty() {
                obj.metadata.namespace = Some(self.namespace.clone());
            }
        } else {
            obj.metadata.namespace = None;
        }
        if obj.types.is_none() {
            obj.types = Some(kind.type_meta());
        }
        let labels = obj.metadata.labels.get_or_insert_with(Default::default);
        for (k, v) in self.labels() {
            labels.insert(k.to_string(), v);
        }
        if let Some(owner_ref) = self.controller_ref_for(kind, &obj) {
            let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);
            refs.retain(|r| r.controller != Some(true));
            refs.push(owner_ref);
        }
        obj
    }

    /// The controller reference the platform accepts for this object, if any
    #[must_use]
    pub fn controller_ref_for(&self, kind: Kind, obj: &DynamicObject) -> Option<OwnerReference> {
        let same_namespace = obj.metadata.namespace.as_deref().unwrap_or_default() == self.namespace;
        if kind.is_namespaced() && same_namespace {
            self.owner_ref.clone()
        } else {
            None
        }
    }

    /// Whether the object carries this owner's tag
    #[must_use]
    pub fn owns(&self, obj: &DynamicObject) -> bool {
        let Some(labels) = obj.metadata.labels.as_ref() else {
            return false;
        };
        let tagged = self
            .labels()
            .iter()
            .all(|(k, v)| labels.get(*k).is_some_and(|l| l == v));
        if !tagged {
            return false;
        }
        let controller = obj
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|r| r.controller == Some(true));
        match (controller, &self.uid) {
            (Some(r), Some(uid)) => r.kind == Jaeger::kind(&()) && &r.uid == uid,
            (Some(r), None) => r.kind == Jaeger::kind(&()) && r.name == self.name,
            (None, _) => true,
        }
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "Jaeger {}", self.name)
        } else {
            write!(f, "Jaeger {}/{}", self.namespace, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn jaeger(ns: &str, name: &str, uid: &str) -> Jaeger {
        let mut j = Jaeger::named(ns, name);
        j.metadata.uid = Some(uid.to_string());
        j
    }

    fn object(ns: &str, name: &str) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()).filter(|n| !n.is_empty()),
                ..ObjectMeta::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn test_stamped_object_is_owned() {
        let owner = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-1"));
        let obj = owner.stamp(Kind::ConfigMap, object("tenant1", "X"));
        assert!(owner.owns(&obj));
        let refs = obj.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "uid-1");
        assert_eq!(refs[0].controller, Some(true));
    }

    #[test]
    fn test_stamp_defaults_namespace_to_owner() {
        let owner = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-1"));
        let obj = owner.stamp(Kind::ConfigMap, object("", "X"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("tenant1"));
        let crb = owner.stamp(Kind::ClusterRoleBinding, object("tenant1", "X"));
        assert!(crb.metadata.namespace.is_none());
        assert!(crb.metadata.owner_references.is_none());
        assert!(owner.owns(&crb));
    }

    #[test]
    fn test_other_namespace_is_not_referenced() {
        let owner = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-1"));
        let obj = owner.stamp(Kind::ConfigMap, object("tenant2", "X"));
        assert!(obj.metadata.owner_references.is_none());
        assert!(owner.owns(&obj));
    }

    #[test]
    fn test_untagged_and_foreign_objects_are_not_owned() {
        let owner = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-1"));
        assert!(!owner.owns(&object("tenant1", "X")));

        let other = OwnerTag::for_instance(&jaeger("tenant2", "simplest", "uid-2"));
        assert!(!owner.owns(&other.stamp(Kind::ConfigMap, object("tenant1", "X"))));

        // same labels, recreated instance with another uid
        let recreated = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-3"));
        assert!(!owner.owns(&recreated.stamp(Kind::ConfigMap, object("tenant1", "X"))));
    }

    #[test]
    fn test_selector() {
        let owner = OwnerTag::for_instance(&jaeger("tenant1", "simplest", "uid-1"));
        assert_eq!(
            owner.selector(),
            "app.kubernetes.io/managed-by=jaeger-operator,app.kubernetes.io/instance=simplest,jaegertracing.io/owner-namespace=tenant1"
        );
        assert_eq!(owner.to_string(), "Jaeger tenant1/simplest");
    }
}
