//! Desired/observed drift detection
//!
//! Decides whether an observed resource must be rewritten to match the
//! desired one. The comparison is deliberately asymmetric:
//!
//! - labels and annotations only need the desired keys to be present, so the
//!   store and co-owning controllers may add their own metadata;
//! - optional fields are compared only when the desired object carries an
//!   opinion, because desired objects are rendered from sparse user
//!   configuration and the store fills in defaults;
//! - store-owned fields (cluster IPs, node ports, injected CA bundles,
//!   appended token secrets) are never compared.
//!
//! A false "needs update" fights the store forever; a false "up to date"
//! silently desynchronizes the cluster. Each kind's rules live in its own
//! module.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::Resource;
use tracing::debug;
use warden_common::kube_utils::{display_name, is_subset};
use warden_common::quantity::quantities_equal;
use warden_common::ReconcileConfig;

mod csi;
mod identity;
mod pod;
mod rbac;
mod service;
mod service_account;
mod webhook;
mod workload;

/// The first field found to differ between observed and desired
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drift {
    field: Cow<'static, str>,
}

impl Drift {
    /// Drift at a static field path
    pub fn at(field: &'static str) -> Self {
        Self {
            field: Cow::Borrowed(field),
        }
    }

    /// Drift at a computed field path (e.g. a named container)
    pub fn at_path(field: String) -> Self {
        Self {
            field: Cow::Owned(field),
        }
    }

    /// Prefix the field path with an enclosing path
    pub(crate) fn within(self, prefix: &str) -> Self {
        Self::at_path(format!("{prefix}.{}", self.field))
    }

    /// Field path that triggered the update
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field)
    }
}

/// Return `Some(Drift::at(field))` when the condition does not hold
pub(crate) fn check(matches: bool, field: &'static str) -> Option<Drift> {
    if matches {
        None
    } else {
        Some(Drift::at(field))
    }
}

/// Per-kind comparison rules
///
/// `self` is the observed object. Metadata labels and annotations have
/// already been checked by the [`Comparator`] when this is called.
pub trait Comparable: Resource<DynamicType = ()> {
    /// The first type-specific field where `self` disagrees with `desired`
    fn spec_drift(&self, desired: &Self, cmp: &Comparator) -> Option<Drift>;

    /// Whether `self` must be updated to match `desired` under default settings
    fn needs_update(&self, desired: &Self) -> bool
    where
        Self: Sized,
    {
        Comparator::default().needs_update(self, desired)
    }
}

/// Stateless comparison engine
///
/// Holds only configuration (the special pod template annotations); safe to
/// share across threads.
#[derive(Clone, Debug)]
pub struct Comparator {
    special_annotations: Vec<String>,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(&ReconcileConfig::default())
    }
}

impl Comparator {
    /// Build a comparator from reconcile configuration
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            special_annotations: config.special_annotations.clone(),
        }
    }

    /// Pod template annotations compared exactly on workloads
    pub fn special_annotations(&self) -> &[String] {
        &self.special_annotations
    }

    /// The first field where `observed` disagrees with `desired`
    pub fn drift<T: Comparable>(&self, observed: &T, desired: &T) -> Option<Drift> {
        metadata_drift(observed, desired).or_else(|| observed.spec_drift(desired, self))
    }

    /// Whether `observed` must be updated to match `desired`
    ///
    /// Logs the triggering field at debug level.
    pub fn needs_update<T: Comparable>(&self, observed: &T, desired: &T) -> bool {
        match self.drift(observed, desired) {
            Some(drift) => {
                debug!(
                    kind = %T::kind(&()),
                    resource = %display_name(observed.meta()),
                    field = %drift,
                    "resource needs update"
                );
                true
            }
            None => false,
        }
    }
}

/// Subset check on labels and annotations
pub(crate) fn metadata_drift<T: Resource>(observed: &T, desired: &T) -> Option<Drift> {
    let (o, d) = (observed.meta(), desired.meta());
    if !is_subset(d.labels.as_ref(), o.labels.as_ref()) {
        return Some(Drift::at("metadata.labels"));
    }
    if !is_subset(d.annotations.as_ref(), o.annotations.as_ref()) {
        return Some(Drift::at("metadata.annotations"));
    }
    None
}

/// The first failed check in evaluation order
pub(crate) fn first_drift<I>(checks: I) -> Option<Drift>
where
    I: IntoIterator<Item = (bool, &'static str)>,
{
    checks
        .into_iter()
        .find(|(matches, _)| !matches)
        .map(|(_, field)| Drift::at(field))
}

// =============================================================================
// Shared field helpers
// =============================================================================

/// Optional field compared only when desired sets it
pub(crate) fn opt_matches<T: PartialEq>(desired: &Option<T>, observed: &Option<T>) -> bool {
    match desired {
        None => true,
        Some(d) => observed.as_ref() == Some(d),
    }
}

/// Borrow an optional list as a slice, treating `None` as empty
pub(crate) fn slice<T>(v: &Option<Vec<T>>) -> &[T] {
    v.as_deref().unwrap_or(&[])
}

/// Optional bool where the store omits `false`
pub(crate) fn flag(v: Option<bool>) -> bool {
    v.unwrap_or(false)
}

/// String maps where `None` and empty are the same
pub(crate) fn maps_equal(
    a: Option<&BTreeMap<String, String>>,
    b: Option<&BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    a.unwrap_or(&empty) == b.unwrap_or(&empty)
}

/// Quantity maps compared by value; `None` and empty are the same
pub(crate) fn quantity_maps_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let (a, b) = (a.unwrap_or(&empty), b.unwrap_or(&empty));
    a.len() == b.len()
        && a.iter()
            .all(|(k, qa)| b.get(k).is_some_and(|qb| quantities_equal(qa, qb)))
}

/// Label selectors where the store turns an absent selector into `{}`
pub(crate) fn selectors_equal(a: Option<&LabelSelector>, b: Option<&LabelSelector>) -> bool {
    fn labels(s: Option<&LabelSelector>) -> Option<&BTreeMap<String, String>> {
        s.and_then(|s| s.match_labels.as_ref())
    }
    fn expressions(s: Option<&LabelSelector>) -> &[LabelSelectorRequirement] {
        s.and_then(|s| s.match_expressions.as_deref())
            .unwrap_or(&[])
    }
    maps_equal(labels(a), labels(b)) && expressions(a) == expressions(b)
}

/// Keyed set comparison: same size, and every desired item has an observed
/// counterpart with the same key for which `matches` holds
pub(crate) fn keyed_set_matches<T, K, KF, MF>(
    desired: &[T],
    observed: &[T],
    key: KF,
    matches: MF,
) -> bool
where
    K: PartialEq,
    KF: Fn(&T) -> K,
    MF: Fn(&T, &T) -> bool,
{
    desired.len() == observed.len()
        && desired.iter().all(|d| {
            let k = key(d);
            observed
                .iter()
                .find(|o| key(o) == k)
                .is_some_and(|o| matches(d, o))
        })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("zero-trust".to_string()),
            ..Default::default()
        }
    }

    pub fn meta_with(name: &str, labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            labels: Some(map(labels)),
            annotations: Some(map(annotations)),
            ..meta(name)
        }
    }
}
