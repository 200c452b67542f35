//! ServiceAccount comparison
//!
//! The token controller appends secrets to service accounts; desired
//! references only need to be present.

use k8s_openapi::api::core::v1::ServiceAccount;

use super::{check, opt_matches, slice, Comparable, Comparator, Drift};

/// Every desired item appears somewhere in observed, order ignored
fn contains_all<T: PartialEq>(desired: &[T], observed: &[T]) -> bool {
    desired.iter().all(|d| observed.contains(d))
}

impl Comparable for ServiceAccount {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        check(
            opt_matches(
                &desired.automount_service_account_token,
                &self.automount_service_account_token,
            ),
            "automountServiceAccountToken",
        )
        .or_else(|| {
            let observed: Vec<_> = slice(&self.secrets).iter().map(|s| &s.name).collect();
            let wanted: Vec<_> = slice(&desired.secrets).iter().map(|s| &s.name).collect();
            check(contains_all(&wanted, &observed), "secrets")
        })
        .or_else(|| {
            check(
                contains_all(
                    slice(&desired.image_pull_secrets),
                    slice(&self.image_pull_secrets),
                ),
                "imagePullSecrets",
            )
        })
    }
}
