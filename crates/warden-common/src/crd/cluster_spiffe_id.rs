//! ClusterSPIFFEID CRD: workload identity binding
//!
//! Declares which pods receive which SPIFFE IDs. The operator renders one of
//! these per trust domain component and keeps it aligned with the desired
//! templates; the SPIRE controller manager consumes it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rust-cased name for the generated `ClusterSPIFFEID` resource
pub type ClusterSpiffeId = ClusterSPIFFEID;

/// Spec for a ClusterSPIFFEID
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spire.spiffe.io",
    version = "v1alpha1",
    kind = "ClusterSPIFFEID",
    plural = "clusterspiffeids",
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.className"}"#,
    printcolumn = r#"{"name":"Template","type":"string","jsonPath":".spec.spiffeIDTemplate"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpiffeIdSpec {
    /// Controller class that should process this identity binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Hint surfaced to workloads to disambiguate multiple identities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Template rendering the SPIFFE ID (e.g. `spiffe://{{ .TrustDomain }}/ns/{{ .PodMeta.Namespace }}`)
    #[serde(rename = "spiffeIDTemplate")]
    pub spiffe_id_template: String,

    /// Use this binding only when no other binding matches the pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,

    /// Add the pod's DNS names to the issued SVID
    #[serde(
        default,
        rename = "autoPopulateDNSNames",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_populate_dns_names: Option<bool>,

    /// Templates rendering extra DNS SANs
    #[serde(default, rename = "dnsNameTemplates", skip_serializing_if = "Vec::is_empty")]
    pub dns_name_templates: Vec<String>,

    /// Pods selected by this binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Namespaces whose pods are selected by this binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Templates rendering additional workload selectors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workload_selector_templates: Vec<String>,

    /// X509 SVID lifetime (e.g. "1h")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// JWT SVID lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_ttl: Option<String>,

    /// Trust domains the issued identities federate with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub federates_with: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    #[test]
    fn test_crd_identity() {
        assert_eq!(ClusterSpiffeId::kind(&()), "ClusterSPIFFEID");
        assert_eq!(ClusterSpiffeId::group(&()), "spire.spiffe.io");
        assert_eq!(ClusterSpiffeId::api_version(&()), "spire.spiffe.io/v1alpha1");
        let crd = ClusterSpiffeId::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("clusterspiffeids.spire.spiffe.io")
        );
        assert_eq!(crd.spec.scope, "Cluster");
    }

    #[test]
    fn test_spec_uses_upstream_field_names() {
        let spec = ClusterSpiffeIdSpec {
            spiffe_id_template: "spiffe://example.org/ns/{{ .PodMeta.Namespace }}".to_string(),
            auto_populate_dns_names: Some(true),
            dns_name_templates: vec!["{{ .PodMeta.Name }}.svc".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("spiffeIDTemplate").is_some());
        assert_eq!(json["autoPopulateDNSNames"], true);
        assert!(json.get("dnsNameTemplates").is_some());
        assert!(json.get("podSelector").is_none());
    }
}
