//! Service comparison
//!
//! Ports are matched by name because the store may reorder them. Cluster IPs,
//! node ports and IP family assignments are store-owned and never compared.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use warden_common::kube_utils::is_subset;

use super::{check, keyed_set_matches, opt_matches, slice, Comparable, Comparator, Drift};

const DEFAULT_PROTOCOL: &str = "TCP";

fn protocol(p: &ServicePort) -> &str {
    p.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
}

/// An unset target port defaults to the service port
fn target_port_matches(desired: &ServicePort, observed: &ServicePort) -> bool {
    match (&desired.target_port, &observed.target_port) {
        (None, None) => true,
        (None, Some(IntOrString::Int(p))) => *p == desired.port,
        (None, Some(_)) => false,
        (Some(d), o) => {
            let defaulted = IntOrString::Int(observed.port);
            *d == *o.as_ref().unwrap_or(&defaulted)
        }
    }
}

fn port_matches(desired: &ServicePort, observed: &ServicePort) -> bool {
    desired.port == observed.port
        && protocol(desired) == protocol(observed)
        && target_port_matches(desired, observed)
        && opt_matches(&desired.app_protocol, &observed.app_protocol)
}

fn ports_match(desired: &ServiceSpec, observed: &ServiceSpec) -> bool {
    keyed_set_matches(
        slice(&desired.ports),
        slice(&observed.ports),
        |p| p.name.clone().unwrap_or_default(),
        port_matches,
    )
}

fn spec_drift(observed: &ServiceSpec, desired: &ServiceSpec) -> Option<Drift> {
    check(ports_match(desired, observed), "spec.ports")
        .or_else(|| {
            check(
                is_subset(desired.selector.as_ref(), observed.selector.as_ref()),
                "spec.selector",
            )
        })
        .or_else(|| check(opt_matches(&desired.type_, &observed.type_), "spec.type"))
        .or_else(|| {
            check(
                opt_matches(&desired.session_affinity, &observed.session_affinity),
                "spec.sessionAffinity",
            )
        })
        .or_else(|| {
            check(
                opt_matches(
                    &desired.internal_traffic_policy,
                    &observed.internal_traffic_policy,
                ),
                "spec.internalTrafficPolicy",
            )
        })
        .or_else(|| {
            check(
                opt_matches(
                    &desired.publish_not_ready_addresses,
                    &observed.publish_not_ready_addresses,
                ),
                "spec.publishNotReadyAddresses",
            )
        })
}

impl Comparable for Service {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        match (&self.spec, &desired.spec) {
            (_, None) => None,
            (None, Some(_)) => Some(Drift::at("spec")),
            (Some(o), Some(d)) => spec_drift(o, d),
        }
    }
}
