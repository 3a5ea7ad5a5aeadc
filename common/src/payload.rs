//! Comparison and merge rules between a desired payload and the observed object.
//!
//! The mutable payload of an object is its labels, its annotations and every
//! top-level field except `apiVersion`, `kind`, `metadata` and `status`.
//! Everything else (resourceVersion, uid, finalizers, status...) belongs to the
//! cluster and is carried over from the observed object on update.
use crate::Result;
use kube::api::DynamicObject;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub static DIGEST_ANNOTATION: &str = "jaegertracing.io/desired-digest";
static STATUS: &str = "status";

fn body(obj: &DynamicObject) -> Map<String, Value> {
    let mut body = obj.data.as_object().cloned().unwrap_or_default();
    body.remove(STATUS);
    body
}

/// sha256 of the mutable payload, ignoring the digest annotation itself
pub fn digest(obj: &DynamicObject) -> Result<String> {
    let mut annotations = obj.metadata.annotations.clone().unwrap_or_default();
    annotations.remove(DIGEST_ANNOTATION);
    let doc = json!({
        "labels": obj.metadata.labels.clone().unwrap_or_default(),
        "annotations": annotations,
        "body": body(obj),
    });
    Ok(sha256::digest(serde_json::to_string(&doc)?))
}

/// Records the payload digest so later passes can detect removed fields
pub fn seal(obj: &mut DynamicObject) -> Result<()> {
    let digest = digest(obj)?;
    obj.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(DIGEST_ANNOTATION.to_string(), digest);
    Ok(())
}

/// Whether every field of `desired` is present with the same value in
/// `observed`. Extra observed fields (server defaults) are tolerated, arrays
/// must match element by element.
#[must_use]
pub fn contains(observed: &Value, desired: &Value) -> bool {
    match (observed, desired) {
        (Value::Object(o), Value::Object(d)) => d.iter().all(|(k, dv)| match o.get(k) {
            Some(ov) => contains(ov, dv),
            None => dv.is_null(),
        }),
        (Value::Array(o), Value::Array(d)) => {
            o.len() == d.len() && o.iter().zip(d.iter()).all(|(ov, dv)| contains(ov, dv))
        }
        (o, d) => o == d,
    }
}

fn map_contains(observed: &Option<BTreeMap<String, String>>, desired: &Option<BTreeMap<String, String>>) -> bool {
    desired.iter().flatten().all(|(k, v)| {
        observed
            .as_ref()
            .and_then(|o| o.get(k))
            .is_some_and(|ov| ov == v)
    })
}

fn digest_of(obj: &DynamicObject) -> Option<&String> {
    obj.metadata.annotations.as_ref()?.get(DIGEST_ANNOTATION)
}

/// Whether applying the sealed `desired` payload onto `observed` would change nothing
///
/// Desired fields are compared as written. Fields the API server rewrites
/// (Secret `stringData` folded into `data`, quantities in canonical form) never
/// match, so objects carrying them are updated on every pass: providers should
/// emit the canonical form.
#[must_use]
pub fn is_up_to_date(observed: &DynamicObject, desired: &DynamicObject) -> bool {
    let desired_refs = desired.metadata.owner_references.iter().flatten();
    let observed_refs = || observed.metadata.owner_references.iter().flatten();
    digest_of(observed).is_some()
        && digest_of(observed) == digest_of(desired)
        && map_contains(&observed.metadata.labels, &desired.metadata.labels)
        && map_contains(&observed.metadata.annotations, &desired.metadata.annotations)
        && contains(&Value::Object(body(observed)), &Value::Object(body(desired)))
        && desired_refs
            .filter(|r| r.controller == Some(true))
            .all(|r| observed_refs().any(|o| o.uid == r.uid && o.controller == Some(true)))
}

/// Builds the replacement object for a compare-and-swap update: the observed
/// object with its mutable payload swapped for the desired one.
#[must_use]
pub fn apply(observed: &DynamicObject, desired: &DynamicObject) -> DynamicObject {
    let mut next = observed.clone();
    next.types = desired.types.clone().or_else(|| observed.types.clone());
    next.metadata.labels = desired.metadata.labels.clone();
    next.metadata.annotations = desired.metadata.annotations.clone();
    if let Some(ctrl) = desired
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true))
    {
        let refs = next.metadata.owner_references.get_or_insert_with(Vec::new);
        refs.retain(|r| r.controller != Some(true));
        refs.push(ctrl.clone());
    }
    let mut data = body(desired);
    if let Some(status) = observed.data.get(STATUS) {
        data.insert(STATUS.to_string(), status.clone());
    }
    next.data = Value::Object(data);
    next
}
