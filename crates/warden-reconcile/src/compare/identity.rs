use warden_common::crd::ClusterSpiffeId;

use super::{first_drift, flag, opt_matches, selectors_equal, Comparable, Comparator, Drift};

impl Comparable for ClusterSpiffeId {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        let (o, d) = (&self.spec, &desired.spec);
        first_drift([
            (d.class_name == o.class_name, "spec.className"),
            (d.hint == o.hint, "spec.hint"),
            (d.spiffe_id_template == o.spiffe_id_template, "spec.spiffeIDTemplate"),
            (flag(d.fallback) == flag(o.fallback), "spec.fallback"),
            (
                flag(d.auto_populate_dns_names) == flag(o.auto_populate_dns_names),
                "spec.autoPopulateDNSNames",
            ),
            (d.dns_name_templates == o.dns_name_templates, "spec.dnsNameTemplates"),
            (
                selectors_equal(d.pod_selector.as_ref(), o.pod_selector.as_ref()),
                "spec.podSelector",
            ),
            (
                selectors_equal(d.namespace_selector.as_ref(), o.namespace_selector.as_ref()),
                "spec.namespaceSelector",
            ),
            (
                d.workload_selector_templates == o.workload_selector_templates,
                "spec.workloadSelectorTemplates",
            ),
            (opt_matches(&d.ttl, &o.ttl), "spec.ttl"),
            (opt_matches(&d.jwt_ttl, &o.jwt_ttl), "spec.jwtTtl"),
            (d.federates_with == o.federates_with, "spec.federatesWith"),
        ])
    }
}
