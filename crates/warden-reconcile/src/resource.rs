//! Managed resource union
//!
//! The closed set of kinds the reconcile layer knows how to compare, plus a
//! dynamic fallback for everything else.

use std::fmt;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::api::storage::v1::CSIDriver;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::Resource;
use tracing::warn;
use warden_common::crd::ClusterSpiffeId;
use warden_common::kube_utils::display_name;

use crate::compare::{metadata_drift, Comparator, Drift};

/// One managed resource of a known kind
#[derive(Clone, Debug)]
pub enum ManagedResource {
    /// Service
    Service(Service),
    /// ServiceAccount
    ServiceAccount(ServiceAccount),
    /// Role
    Role(Role),
    /// ClusterRole
    ClusterRole(ClusterRole),
    /// RoleBinding
    RoleBinding(RoleBinding),
    /// ClusterRoleBinding
    ClusterRoleBinding(ClusterRoleBinding),
    /// CSIDriver
    CsiDriver(CSIDriver),
    /// ValidatingWebhookConfiguration
    ValidatingWebhook(ValidatingWebhookConfiguration),
    /// MutatingWebhookConfiguration
    MutatingWebhook(MutatingWebhookConfiguration),
    /// StatefulSet
    StatefulSet(StatefulSet),
    /// Deployment
    Deployment(Deployment),
    /// DaemonSet
    DaemonSet(DaemonSet),
    /// ClusterSPIFFEID
    ClusterSpiffeId(ClusterSpiffeId),
    /// Any other kind; only metadata is compared
    Other(DynamicObject),
}

/// Expands `$body` once per typed variant with `$r` bound to the inner value
macro_rules! each_typed {
    ($value:expr, $r:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $value {
            ManagedResource::Service($r) => $body,
            ManagedResource::ServiceAccount($r) => $body,
            ManagedResource::Role($r) => $body,
            ManagedResource::ClusterRole($r) => $body,
            ManagedResource::RoleBinding($r) => $body,
            ManagedResource::ClusterRoleBinding($r) => $body,
            ManagedResource::CsiDriver($r) => $body,
            ManagedResource::ValidatingWebhook($r) => $body,
            ManagedResource::MutatingWebhook($r) => $body,
            ManagedResource::StatefulSet($r) => $body,
            ManagedResource::Deployment($r) => $body,
            ManagedResource::DaemonSet($r) => $body,
            ManagedResource::ClusterSpiffeId($r) => $body,
            ManagedResource::Other($other) => $fallback,
        }
    };
}

fn typed_kind<K: Resource<DynamicType = ()>>(_: &K) -> String {
    K::kind(&()).into_owned()
}

impl ManagedResource {
    /// Kubernetes kind name
    pub fn kind(&self) -> String {
        each_typed!(self, r => typed_kind(r), o => o
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        each_typed!(self, r => r.meta(), o => &o.metadata)
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        each_typed!(self, r => r.meta_mut(), o => &mut o.metadata)
    }

    /// Identity used by the resource store
    pub fn id(&self) -> ResourceId {
        let meta = self.meta();
        ResourceId {
            kind: self.kind(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// The first field where `self` (observed) disagrees with `desired`
    ///
    /// Unknown kinds compare labels and annotations only. A kind-mismatched
    /// pair is a caller error and reports no drift.
    pub fn drift(&self, desired: &Self, cmp: &Comparator) -> Option<Drift> {
        use ManagedResource as M;
        match (self, desired) {
            (M::Service(o), M::Service(d)) => cmp.drift(o, d),
            (M::ServiceAccount(o), M::ServiceAccount(d)) => cmp.drift(o, d),
            (M::Role(o), M::Role(d)) => cmp.drift(o, d),
            (M::ClusterRole(o), M::ClusterRole(d)) => cmp.drift(o, d),
            (M::RoleBinding(o), M::RoleBinding(d)) => cmp.drift(o, d),
            (M::ClusterRoleBinding(o), M::ClusterRoleBinding(d)) => cmp.drift(o, d),
            (M::CsiDriver(o), M::CsiDriver(d)) => cmp.drift(o, d),
            (M::ValidatingWebhook(o), M::ValidatingWebhook(d)) => cmp.drift(o, d),
            (M::MutatingWebhook(o), M::MutatingWebhook(d)) => cmp.drift(o, d),
            (M::StatefulSet(o), M::StatefulSet(d)) => cmp.drift(o, d),
            (M::Deployment(o), M::Deployment(d)) => cmp.drift(o, d),
            (M::DaemonSet(o), M::DaemonSet(d)) => cmp.drift(o, d),
            (M::ClusterSpiffeId(o), M::ClusterSpiffeId(d)) => cmp.drift(o, d),
            (M::Other(o), M::Other(d)) => {
                // Reported for visibility; unknown kinds are never auto-corrected
                if let Some(drift) = metadata_drift(o, d) {
                    warn!(
                        kind = %self.kind(),
                        resource = %display_name(&o.metadata),
                        field = %drift,
                        "unknown kind has drifted metadata, leaving as is"
                    );
                }
                None
            }
            _ => {
                warn!(
                    observed = %self.kind(),
                    desired = %desired.kind(),
                    resource = %display_name(self.meta()),
                    "kind mismatch between observed and desired, skipping comparison"
                );
                None
            }
        }
    }

    /// Whether `self` (observed) must be updated to match `desired`
    pub fn needs_update(&self, desired: &Self, cmp: &Comparator) -> bool {
        self.drift(desired, cmp).is_some()
    }
}

/// Free-function form of [`ManagedResource::needs_update`] with default settings
pub fn needs_update(observed: &ManagedResource, desired: &ManagedResource) -> bool {
    observed.needs_update(desired, &Comparator::default())
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ManagedResource {
                fn from(r: $ty) -> Self {
                    ManagedResource::$variant(r)
                }
            }
        )*
    };
}

impl_from! {
    Service => Service,
    ServiceAccount => ServiceAccount,
    Role => Role,
    ClusterRole => ClusterRole,
    RoleBinding => RoleBinding,
    ClusterRoleBinding => ClusterRoleBinding,
    CSIDriver => CsiDriver,
    ValidatingWebhookConfiguration => ValidatingWebhook,
    MutatingWebhookConfiguration => MutatingWebhook,
    StatefulSet => StatefulSet,
    Deployment => Deployment,
    DaemonSet => DaemonSet,
    ClusterSpiffeId => ClusterSpiffeId,
    DynamicObject => Other,
}

/// Kind plus namespaced name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Kubernetes kind name
    pub kind: String,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ResourceId {
    /// Build an identity
    pub fn new(kind: impl Into<String>, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}
