//! User-facing scheduling and labeling fields
//!
//! Every operand section of the operator's configuration CRD embeds this
//! struct. The fields are passed through to rendered workloads after
//! validation.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Common scheduling, resource and label settings for an operand
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSpec {
    /// Pod affinity rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Node selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Container resource requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Extra labels applied to rendered resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl SchedulingSpec {
    /// True when no field carries an opinion
    pub fn is_empty(&self) -> bool {
        self.affinity.is_none()
            && self.tolerations.is_empty()
            && self.node_selector.is_empty()
            && self.resources.is_none()
            && self.labels.is_empty()
    }
}
