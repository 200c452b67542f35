//! Scheduling and labeling field validation
//!
//! Two modes over the same rules. [`validate_detailed`] checks every field
//! group and returns one [`ValidationResult`] per failing group, ready to be
//! written as status conditions. [`validate`] stops at the first failure in
//! the fixed order affinity, tolerations, nodeSelector, resources, labels.

mod affinity;
mod labels;
mod resources;
mod tolerations;

use std::collections::BTreeMap;

use tracing::warn;
use warden_common::config::DEFAULT_CONDITION_TYPE;
use warden_common::crd::{Condition, ConditionStatus, SchedulingSpec};
use warden_common::Error;

pub use affinity::validate_affinity;
pub use labels::{validate_labels, MAX_LABEL_LENGTH};
pub use resources::validate_resources;
pub use tolerations::validate_tolerations;

/// Field group names, in check order
pub mod field {
    /// Pod affinity rules
    pub const AFFINITY: &str = "affinity";
    /// Tolerations
    pub const TOLERATIONS: &str = "tolerations";
    /// Node selector
    pub const NODE_SELECTOR: &str = "nodeSelector";
    /// Resource requests and limits
    pub const RESOURCES: &str = "resources";
    /// Labels
    pub const LABELS: &str = "labels";
}

/// Condition reasons, one per field group
pub mod reason {
    /// Invalid affinity
    pub const INVALID_AFFINITY: &str = "InvalidAffinity";
    /// Invalid tolerations
    pub const INVALID_TOLERATIONS: &str = "InvalidTolerations";
    /// Invalid node selector
    pub const INVALID_NODE_SELECTOR: &str = "InvalidNodeSelector";
    /// Invalid resources
    pub const INVALID_RESOURCES: &str = "InvalidResources";
    /// Invalid labels
    pub const INVALID_LABELS: &str = "InvalidLabels";
}

/// Validate node selector keys; empty values are allowed
pub fn validate_node_selector(selector: &BTreeMap<String, String>) -> Result<(), String> {
    if selector.keys().any(String::is_empty) {
        return Err("node selector key must not be empty".to_string());
    }
    Ok(())
}

/// One failed field group
#[derive(Debug)]
pub struct ValidationResult {
    /// Field group name (e.g. "tolerations")
    pub field: &'static str,
    /// Status condition type the failure is reported under
    pub condition_type: String,
    /// Status condition reason for this field group
    pub reason: &'static str,
    /// Human-readable message
    pub message: String,
    /// The underlying validation error
    pub cause: Error,
}

impl ValidationResult {
    fn new(field: &'static str, reason: &'static str, condition_type: &str, message: String) -> Self {
        let cause = Error::validation(field, message);
        Self {
            field,
            condition_type: condition_type.to_string(),
            reason,
            message: cause.to_string(),
            cause,
        }
    }

    /// Status condition describing this failure
    pub fn to_condition(&self) -> Condition {
        Condition::new(
            &self.condition_type,
            ConditionStatus::False,
            self.reason,
            &self.message,
        )
    }
}

type Check = (&'static str, &'static str, Option<Result<(), String>>);

/// Every field group's verdict in check order; `None` means nothing to check
fn run_checks(spec: &SchedulingSpec) -> [Check; 5] {
    [
        (
            field::AFFINITY,
            reason::INVALID_AFFINITY,
            spec.affinity.as_ref().map(validate_affinity),
        ),
        (
            field::TOLERATIONS,
            reason::INVALID_TOLERATIONS,
            Some(validate_tolerations(&spec.tolerations)),
        ),
        (
            field::NODE_SELECTOR,
            reason::INVALID_NODE_SELECTOR,
            Some(validate_node_selector(&spec.node_selector)),
        ),
        (
            field::RESOURCES,
            reason::INVALID_RESOURCES,
            spec.resources.as_ref().map(validate_resources),
        ),
        (
            field::LABELS,
            reason::INVALID_LABELS,
            Some(validate_labels(&spec.labels)),
        ),
    ]
}

/// Check every field group and collect all failures
pub fn validate_detailed(spec: &SchedulingSpec) -> Vec<ValidationResult> {
    validate_detailed_as(spec, DEFAULT_CONDITION_TYPE)
}

/// [`validate_detailed`] reporting under a custom condition type
pub fn validate_detailed_as(spec: &SchedulingSpec, condition_type: &str) -> Vec<ValidationResult> {
    run_checks(spec)
        .into_iter()
        .filter_map(|(field, reason, verdict)| match verdict {
            Some(Err(message)) => {
                let result = ValidationResult::new(field, reason, condition_type, message);
                warn!(field, reason, message = %result.message, "scheduling spec failed validation");
                Some(result)
            }
            _ => None,
        })
        .collect()
}

/// Return the first failure as [`Error::Validation`]
pub fn validate(spec: &SchedulingSpec) -> Result<(), Error> {
    if let Some(affinity) = &spec.affinity {
        validate_affinity(affinity).map_err(|m| Error::validation(field::AFFINITY, m))?;
    }
    validate_tolerations(&spec.tolerations).map_err(|m| Error::validation(field::TOLERATIONS, m))?;
    validate_node_selector(&spec.node_selector)
        .map_err(|m| Error::validation(field::NODE_SELECTOR, m))?;
    if let Some(resources) = &spec.resources {
        validate_resources(resources).map_err(|m| Error::validation(field::RESOURCES, m))?;
    }
    validate_labels(&spec.labels).map_err(|m| Error::validation(field::LABELS, m))?;
    Ok(())
}
