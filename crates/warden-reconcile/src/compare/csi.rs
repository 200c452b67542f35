use k8s_openapi::api::storage::v1::CSIDriver;

use super::{first_drift, opt_matches, Comparable, Comparator, Drift};

impl Comparable for CSIDriver {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        let (o, d) = (&self.spec, &desired.spec);
        first_drift([
            (opt_matches(&d.attach_required, &o.attach_required), "spec.attachRequired"),
            (opt_matches(&d.pod_info_on_mount, &o.pod_info_on_mount), "spec.podInfoOnMount"),
            (opt_matches(&d.fs_group_policy, &o.fs_group_policy), "spec.fsGroupPolicy"),
            (
                opt_matches(&d.volume_lifecycle_modes, &o.volume_lifecycle_modes),
                "spec.volumeLifecycleModes",
            ),
            (opt_matches(&d.requires_republish, &o.requires_republish), "spec.requiresRepublish"),
            (opt_matches(&d.storage_capacity, &o.storage_capacity), "spec.storageCapacity"),
            (opt_matches(&d.se_linux_mount, &o.se_linux_mount), "spec.seLinuxMount"),
            (opt_matches(&d.token_requests, &o.token_requests), "spec.tokenRequests"),
        ])
    }
}
