//! Shared Kubernetes metadata helpers
//!
//! Small accessors over `ObjectMeta` used by the comparator, the create-only
//! latch and the fingerprint stamping code.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Label key identifying the component that manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for Warden-managed resources
pub const LABEL_MANAGED_BY_WARDEN: &str = "warden";

/// Build metadata with a name and optional namespace
pub fn object_meta(name: impl Into<String>, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// Look up an annotation value
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// True when the annotation is present with exactly this value
pub fn has_annotation_value(meta: &ObjectMeta, key: &str, value: &str) -> bool {
    annotation(meta, key) == Some(value)
}

/// Set an annotation, creating the map if needed
pub fn set_annotation(meta: &mut ObjectMeta, key: impl Into<String>, value: impl Into<String>) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.into(), value.into());
}

/// Set a label, creating the map if needed
pub fn set_label(meta: &mut ObjectMeta, key: impl Into<String>, value: impl Into<String>) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.into(), value.into());
}

/// Subset match for string maps
///
/// Every key in `desired` must exist in `observed` with the same value.
/// Keys only present in `observed` are ignored, and an absent or empty
/// `desired` matches anything.
pub fn is_subset(
    desired: Option<&BTreeMap<String, String>>,
    observed: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    if desired.is_empty() {
        return true;
    }
    let Some(observed) = observed else {
        return false;
    };
    desired
        .iter()
        .all(|(k, v)| observed.get(k).is_some_and(|ov| ov == v))
}

/// "namespace/name" or "name" for cluster-scoped objects, for log fields
pub fn display_name(meta: &ObjectMeta) -> String {
    let name = meta.name.as_deref().unwrap_or("<unnamed>");
    match meta.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}
