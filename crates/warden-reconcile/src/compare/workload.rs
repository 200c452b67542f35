//! StatefulSet, Deployment and DaemonSet comparison

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use warden_common::kube_utils::annotation;
use warden_common::quantity::quantities_equal;

use super::pod::pod_spec_drift;
use super::{
    check, keyed_set_matches, maps_equal, opt_matches, selectors_equal, slice, Comparable, Comparator,
    Drift,
};

/// Selector, pod template labels, special annotations and the pod spec
fn template_drift(
    cmp: &Comparator,
    desired_selector: &LabelSelector,
    observed_selector: &LabelSelector,
    desired: &PodTemplateSpec,
    observed: &PodTemplateSpec,
) -> Option<Drift> {
    if !selectors_equal(Some(desired_selector), Some(observed_selector)) {
        return Some(Drift::at("spec.selector"));
    }

    let empty = ObjectMeta::default();
    let d_meta = desired.metadata.as_ref().unwrap_or(&empty);
    let o_meta = observed.metadata.as_ref().unwrap_or(&empty);
    if !maps_equal(d_meta.labels.as_ref(), o_meta.labels.as_ref()) {
        return Some(Drift::at("spec.template.metadata.labels"));
    }
    if let Some(key) = cmp
        .special_annotations()
        .iter()
        .find(|key| annotation(d_meta, key) != annotation(o_meta, key))
    {
        return Some(Drift::at_path(format!(
            "spec.template.metadata.annotations[{key}]"
        )));
    }

    match (&desired.spec, &observed.spec) {
        (None, _) => None,
        (Some(_), None) => Some(Drift::at("spec.template.spec")),
        (Some(d), Some(o)) => pod_spec_drift(d, o).map(|drift| drift.within("spec.template.spec")),
    }
}

fn storage_request(pvc: &PersistentVolumeClaim) -> Option<&Quantity> {
    pvc.spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"))
}

fn access_modes(pvc: &PersistentVolumeClaim) -> &[String] {
    pvc.spec
        .as_ref()
        .map(|s| slice(&s.access_modes))
        .unwrap_or(&[])
}

fn claim_matches(desired: &PersistentVolumeClaim, observed: &PersistentVolumeClaim) -> bool {
    let storage = match (storage_request(desired), storage_request(observed)) {
        (None, _) => true,
        (Some(d), Some(o)) => quantities_equal(d, o),
        (Some(_), None) => false,
    };
    storage && access_modes(desired) == access_modes(observed)
}

impl Comparable for StatefulSet {
    fn spec_drift(&self, desired: &Self, cmp: &Comparator) -> Option<Drift> {
        let (o, d) = match (&self.spec, &desired.spec) {
            (_, None) => return None,
            (None, Some(_)) => return Some(Drift::at("spec")),
            (Some(o), Some(d)) => (o, d),
        };
        check(opt_matches(&d.replicas, &o.replicas), "spec.replicas")
            .or_else(|| template_drift(cmp, &d.selector, &o.selector, &d.template, &o.template))
            .or_else(|| {
                check(
                    keyed_set_matches(
                        slice(&d.volume_claim_templates),
                        slice(&o.volume_claim_templates),
                        |c| c.metadata.name.clone(),
                        claim_matches,
                    ),
                    "spec.volumeClaimTemplates",
                )
            })
    }
}

impl Comparable for Deployment {
    fn spec_drift(&self, desired: &Self, cmp: &Comparator) -> Option<Drift> {
        let (o, d) = match (&self.spec, &desired.spec) {
            (_, None) => return None,
            (None, Some(_)) => return Some(Drift::at("spec")),
            (Some(o), Some(d)) => (o, d),
        };
        check(opt_matches(&d.replicas, &o.replicas), "spec.replicas")
            .or_else(|| template_drift(cmp, &d.selector, &o.selector, &d.template, &o.template))
    }
}

impl Comparable for DaemonSet {
    fn spec_drift(&self, desired: &Self, cmp: &Comparator) -> Option<Drift> {
        match (&self.spec, &desired.spec) {
            (_, None) => None,
            (None, Some(_)) => Some(Drift::at("spec")),
            (Some(o), Some(d)) => {
                template_drift(cmp, &d.selector, &o.selector, &d.template, &o.template)
            }
        }
    }
}
