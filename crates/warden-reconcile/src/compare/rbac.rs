//! RBAC comparison
//!
//! Rules are compared exactly. A binding's role reference is immutable in the
//! store, so a mismatch is reported but never corrected here.

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding, RoleRef};
use kube::Resource;
use tracing::warn;
use warden_common::kube_utils::display_name;

use super::{check, opt_matches, slice, Comparable, Comparator, Drift};

impl Comparable for Role {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        check(slice(&desired.rules) == slice(&self.rules), "rules")
    }
}

impl Comparable for ClusterRole {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        // Aggregated roles have their rules filled in by the aggregation controller
        if desired.aggregation_rule.is_some() {
            return check(
                opt_matches(&desired.aggregation_rule, &self.aggregation_rule),
                "aggregationRule",
            );
        }
        check(slice(&desired.rules) == slice(&self.rules), "rules")
    }
}

fn warn_role_ref_mismatch<K: Resource>(observed: &K, observed_ref: &RoleRef, desired_ref: &RoleRef) {
    if observed_ref != desired_ref {
        warn!(
            binding = %display_name(observed.meta()),
            observed = %observed_ref.name,
            desired = %desired_ref.name,
            "roleRef differs but is immutable; delete the binding to change it"
        );
    }
}

impl Comparable for RoleBinding {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        warn_role_ref_mismatch(self, &self.role_ref, &desired.role_ref);
        check(slice(&desired.subjects) == slice(&self.subjects), "subjects")
    }
}

impl Comparable for ClusterRoleBinding {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        warn_role_ref_mismatch(self, &self.role_ref, &desired.role_ref);
        check(slice(&desired.subjects) == slice(&self.subjects), "subjects")
    }
}
