//! Pod template comparison shared by the workload kinds
//!
//! Containers, init containers and volumes are matched by name. Fields the
//! store defaults (pull policy, probe timings, volume modes, env `fieldRef`
//! API versions) count only when the desired template sets them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec, Probe, ResourceRequirements,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::{
    check, first_drift, flag, keyed_set_matches, maps_equal, opt_matches, quantity_maps_equal,
    slice, Drift,
};

const DEFAULT_PROTOCOL: &str = "TCP";

/// Drop the observed value when desired has no opinion
fn clear_unset<T>(desired: &Option<T>, observed: &mut Option<T>) {
    if desired.is_none() {
        *observed = None;
    }
}

/// First drifting field of a pod spec, relative to the spec itself
pub(crate) fn pod_spec_drift(desired: &PodSpec, observed: &PodSpec) -> Option<Drift> {
    first_drift([
        (
            opt_matches(&desired.service_account_name, &observed.service_account_name),
            "serviceAccountName",
        ),
        (
            opt_matches(&desired.share_process_namespace, &observed.share_process_namespace),
            "shareProcessNamespace",
        ),
        (opt_matches(&desired.dns_policy, &observed.dns_policy), "dnsPolicy"),
        (opt_matches(&desired.affinity, &observed.affinity), "affinity"),
        (
            slice(&desired.tolerations).is_empty()
                || slice(&desired.tolerations) == slice(&observed.tolerations),
            "tolerations",
        ),
        (
            desired.node_selector.as_ref().map_or(true, |m| m.is_empty())
                || maps_equal(desired.node_selector.as_ref(), observed.node_selector.as_ref()),
            "nodeSelector",
        ),
        (
            keyed_set_matches(
                slice(&desired.volumes),
                slice(&observed.volumes),
                |v| v.name.clone(),
                volume_matches,
            ),
            "volumes",
        ),
    ])
    .or_else(|| {
        containers_drift(
            "initContainers",
            slice(&desired.init_containers),
            slice(&observed.init_containers),
        )
    })
    .or_else(|| containers_drift("containers", &desired.containers, &observed.containers))
}

// =============================================================================
// Volumes
// =============================================================================

fn volume_matches(desired: &Volume, observed: &Volume) -> bool {
    let mut o = observed.clone();

    if let (Some(d), Some(o)) = (&desired.config_map, &mut o.config_map) {
        clear_unset(&d.default_mode, &mut o.default_mode);
    }
    if let (Some(d), Some(o)) = (&desired.secret, &mut o.secret) {
        clear_unset(&d.default_mode, &mut o.default_mode);
    }
    if let (Some(d), Some(o)) = (&desired.downward_api, &mut o.downward_api) {
        clear_unset(&d.default_mode, &mut o.default_mode);
    }
    if let (Some(d), Some(o)) = (&desired.host_path, &mut o.host_path) {
        clear_unset(&d.type_, &mut o.type_);
    }
    if let (Some(d), Some(o)) = (&desired.projected, &mut o.projected) {
        clear_unset(&d.default_mode, &mut o.default_mode);
        let sources = slice(&d.sources).iter().zip(o.sources.iter_mut().flatten());
        for (ds, os) in sources {
            let tokens = (&ds.service_account_token, &mut os.service_account_token);
            if let (Some(dt), Some(ot)) = tokens {
                clear_unset(&dt.expiration_seconds, &mut ot.expiration_seconds);
            }
        }
    }

    *desired == o
}

// =============================================================================
// Containers
// =============================================================================

/// Every desired container must be present by name and match; observed-only
/// containers (injected sidecars) are ignored
fn containers_drift(kind: &str, desired: &[Container], observed: &[Container]) -> Option<Drift> {
    desired.iter().find_map(|d| {
        let prefix = format!("{kind}[{}]", d.name);
        match observed.iter().find(|o| o.name == d.name) {
            None => Some(Drift::at_path(prefix)),
            Some(o) => container_drift(d, o).map(|drift| drift.within(&prefix)),
        }
    })
}

fn container_drift(desired: &Container, observed: &Container) -> Option<Drift> {
    first_drift([
        (desired.image == observed.image, "image"),
        (
            opt_matches(&desired.image_pull_policy, &observed.image_pull_policy),
            "imagePullPolicy",
        ),
        (slice(&desired.command) == slice(&observed.command), "command"),
        (slice(&desired.args) == slice(&observed.args), "args"),
        (env_matches(slice(&desired.env), slice(&observed.env)), "env"),
        (ports_match(slice(&desired.ports), slice(&observed.ports)), "ports"),
        (
            probe_matches(desired.readiness_probe.as_ref(), observed.readiness_probe.as_ref()),
            "readinessProbe",
        ),
        (
            probe_matches(desired.liveness_probe.as_ref(), observed.liveness_probe.as_ref()),
            "livenessProbe",
        ),
        (
            probe_matches(desired.startup_probe.as_ref(), observed.startup_probe.as_ref()),
            "startupProbe",
        ),
        (
            keyed_set_matches(
                slice(&desired.volume_mounts),
                slice(&observed.volume_mounts),
                |m| (m.name.clone(), m.mount_path.clone()),
                mount_matches,
            ),
            "volumeMounts",
        ),
        (
            resources_match(desired.resources.as_ref(), observed.resources.as_ref()),
            "resources",
        ),
    ])
    .or_else(|| match (&desired.security_context, &observed.security_context) {
        (None, _) => None,
        (Some(d), None) => check(*d == SecurityContext::default(), "securityContext"),
        (Some(d), Some(o)) => {
            security_context_drift(d, o).map(|drift| drift.within("securityContext"))
        }
    })
}

fn env_var_matches(desired: &EnvVar, observed: &EnvVar) -> bool {
    let mut o = observed.clone();
    let field_refs = (
        desired.value_from.as_ref().and_then(|v| v.field_ref.as_ref()),
        o.value_from.as_mut().and_then(|v| v.field_ref.as_mut()),
    );
    if let (Some(d), Some(o)) = field_refs {
        clear_unset(&d.api_version, &mut o.api_version);
    }
    *desired == o
}

fn env_matches(desired: &[EnvVar], observed: &[EnvVar]) -> bool {
    desired.len() == observed.len()
        && desired
            .iter()
            .zip(observed)
            .all(|(d, o)| env_var_matches(d, o))
}

fn port_key(p: &ContainerPort) -> (i32, String) {
    (
        p.container_port,
        p.protocol.clone().unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
    )
}

fn ports_match(desired: &[ContainerPort], observed: &[ContainerPort]) -> bool {
    keyed_set_matches(desired, observed, port_key, |d, o| {
        opt_matches(&d.name, &o.name)
            && opt_matches(&d.host_port, &o.host_port)
            && opt_matches(&d.host_ip, &o.host_ip)
    })
}

fn http_get_matches(desired: &HTTPGetAction, observed: &HTTPGetAction) -> bool {
    desired.port == observed.port
        && desired.path == observed.path
        && opt_matches(&desired.host, &observed.host)
        && opt_matches(&desired.scheme, &observed.scheme)
        && slice(&desired.http_headers) == slice(&observed.http_headers)
}

fn probe_matches(desired: Option<&Probe>, observed: Option<&Probe>) -> bool {
    let (d, o) = match (desired, observed) {
        (None, None) => return true,
        (Some(d), Some(o)) => (d, o),
        _ => return false,
    };
    let http_get = match (&d.http_get, &o.http_get) {
        (None, None) => true,
        (Some(d), Some(o)) => http_get_matches(d, o),
        _ => false,
    };
    http_get
        && d.exec == o.exec
        && d.tcp_socket == o.tcp_socket
        && d.grpc == o.grpc
        && opt_matches(&d.initial_delay_seconds, &o.initial_delay_seconds)
        && opt_matches(&d.period_seconds, &o.period_seconds)
        && opt_matches(&d.timeout_seconds, &o.timeout_seconds)
        && opt_matches(&d.success_threshold, &o.success_threshold)
        && opt_matches(&d.failure_threshold, &o.failure_threshold)
        && opt_matches(
            &d.termination_grace_period_seconds,
            &o.termination_grace_period_seconds,
        )
}

fn mount_matches(desired: &VolumeMount, observed: &VolumeMount) -> bool {
    flag(desired.read_only) == flag(observed.read_only)
        && desired.sub_path.as_deref().unwrap_or_default()
            == observed.sub_path.as_deref().unwrap_or_default()
        && opt_matches(&desired.sub_path_expr, &observed.sub_path_expr)
        && opt_matches(&desired.mount_propagation, &observed.mount_propagation)
}

fn resources_match(
    desired: Option<&ResourceRequirements>,
    observed: Option<&ResourceRequirements>,
) -> bool {
    quantity_maps_equal(limits(desired), limits(observed))
        && quantity_maps_equal(requests(desired), requests(observed))
}

fn limits(r: Option<&ResourceRequirements>) -> Option<&BTreeMap<String, Quantity>> {
    r.and_then(|r| r.limits.as_ref())
}

fn requests(r: Option<&ResourceRequirements>) -> Option<&BTreeMap<String, Quantity>> {
    r.and_then(|r| r.requests.as_ref())
}

fn security_context_drift(d: &SecurityContext, o: &SecurityContext) -> Option<Drift> {
    first_drift([
        (
            opt_matches(&d.allow_privilege_escalation, &o.allow_privilege_escalation),
            "allowPrivilegeEscalation",
        ),
        (opt_matches(&d.capabilities, &o.capabilities), "capabilities"),
        (opt_matches(&d.privileged, &o.privileged), "privileged"),
        (opt_matches(&d.proc_mount, &o.proc_mount), "procMount"),
        (
            opt_matches(&d.read_only_root_filesystem, &o.read_only_root_filesystem),
            "readOnlyRootFilesystem",
        ),
        (opt_matches(&d.run_as_group, &o.run_as_group), "runAsGroup"),
        (opt_matches(&d.run_as_non_root, &o.run_as_non_root), "runAsNonRoot"),
        (opt_matches(&d.run_as_user, &o.run_as_user), "runAsUser"),
        (opt_matches(&d.se_linux_options, &o.se_linux_options), "seLinuxOptions"),
        (opt_matches(&d.seccomp_profile, &o.seccomp_profile), "seccompProfile"),
        (opt_matches(&d.windows_options, &o.windows_options), "windowsOptions"),
        (opt_matches(&d.app_armor_profile, &o.app_armor_profile), "appArmorProfile"),
    ])
}
