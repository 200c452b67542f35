//! Affinity validation

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelectorRequirement, NodeSelectorTerm, PodAffinityTerm,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

const NODE_OPERATORS: &[&str] = &["In", "NotIn", "Exists", "DoesNotExist", "Gt", "Lt"];
const LABEL_OPERATORS: &[&str] = &["In", "NotIn", "Exists", "DoesNotExist"];

const MIN_WEIGHT: i32 = 1;
const MAX_WEIGHT: i32 = 100;

/// Validate node, pod and pod anti-affinity rules
pub fn validate_affinity(affinity: &Affinity) -> Result<(), String> {
    if let Some(node) = &affinity.node_affinity {
        validate_node_affinity(node)?;
    }
    if let Some(pod) = &affinity.pod_affinity {
        validate_pod_terms(
            "podAffinity",
            pod.required_during_scheduling_ignored_during_execution.as_deref(),
            pod.preferred_during_scheduling_ignored_during_execution.as_deref(),
        )?;
    }
    if let Some(anti) = &affinity.pod_anti_affinity {
        validate_pod_terms(
            "podAntiAffinity",
            anti.required_during_scheduling_ignored_during_execution.as_deref(),
            anti.preferred_during_scheduling_ignored_during_execution.as_deref(),
        )?;
    }
    Ok(())
}

fn validate_node_affinity(node: &NodeAffinity) -> Result<(), String> {
    if let Some(required) = &node.required_during_scheduling_ignored_during_execution {
        if required.node_selector_terms.is_empty() {
            return Err("nodeAffinity required terms must not be empty".to_string());
        }
        for (i, term) in required.node_selector_terms.iter().enumerate() {
            let has_requirements = term.match_expressions.as_ref().is_some_and(|e| !e.is_empty())
                || term.match_fields.as_ref().is_some_and(|f| !f.is_empty());
            if !has_requirements {
                return Err(format!(
                    "nodeAffinity required term {i} needs at least one matchExpression or matchField"
                ));
            }
            validate_node_term(term)?;
        }
    }

    for term in node
        .preferred_during_scheduling_ignored_during_execution
        .iter()
        .flatten()
    {
        validate_weight(term.weight)?;
        validate_node_term(&term.preference)?;
    }
    Ok(())
}

fn validate_node_term(term: &NodeSelectorTerm) -> Result<(), String> {
    term.match_expressions
        .iter()
        .chain(term.match_fields.iter())
        .flatten()
        .try_for_each(validate_node_requirement)
}

fn validate_node_requirement(req: &NodeSelectorRequirement) -> Result<(), String> {
    validate_requirement(
        &req.key,
        &req.operator,
        req.values.as_deref().unwrap_or_default(),
        NODE_OPERATORS,
    )
}

fn validate_pod_terms(
    kind: &str,
    required: Option<&[PodAffinityTerm]>,
    preferred: Option<&[WeightedPodAffinityTerm]>,
) -> Result<(), String> {
    for term in required.unwrap_or_default() {
        validate_pod_term(kind, term)?;
    }
    for weighted in preferred.unwrap_or_default() {
        validate_weight(weighted.weight)?;
        validate_pod_term(kind, &weighted.pod_affinity_term)?;
    }
    Ok(())
}

fn validate_pod_term(kind: &str, term: &PodAffinityTerm) -> Result<(), String> {
    if term.topology_key.is_empty() {
        return Err(format!("{kind} term requires a topologyKey"));
    }
    if let Some(selector) = &term.label_selector {
        validate_label_selector(selector)?;
    }
    if let Some(selector) = &term.namespace_selector {
        validate_label_selector(selector)?;
    }
    Ok(())
}

fn validate_label_selector(selector: &LabelSelector) -> Result<(), String> {
    selector
        .match_expressions
        .iter()
        .flatten()
        .try_for_each(|req: &LabelSelectorRequirement| {
            validate_requirement(
                &req.key,
                &req.operator,
                req.values.as_deref().unwrap_or_default(),
                LABEL_OPERATORS,
            )
        })
}

fn validate_weight(weight: i32) -> Result<(), String> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(())
    } else {
        Err(format!(
            "weight {weight} must be between {MIN_WEIGHT} and {MAX_WEIGHT}"
        ))
    }
}

/// Key, operator and per-operator value count
fn validate_requirement(
    key: &str,
    operator: &str,
    values: &[String],
    operators: &[&str],
) -> Result<(), String> {
    if key.is_empty() {
        return Err("requirement key must not be empty".to_string());
    }
    if !operators.contains(&operator) {
        return Err(format!(
            "requirement '{key}' has unknown operator '{operator}'"
        ));
    }
    let count_ok = match operator {
        "In" | "NotIn" => !values.is_empty(),
        "Exists" | "DoesNotExist" => values.is_empty(),
        "Gt" | "Lt" => values.len() == 1,
        _ => false,
    };
    if !count_ok {
        return Err(format!(
            "requirement '{key}' with operator {operator} has {} values",
            values.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn affinity(value: serde_json::Value) -> Affinity {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_node_and_pod_affinity() {
        let a = affinity(json!({
            "nodeAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": {
                    "nodeSelectorTerms": [{
                        "matchExpressions": [
                            { "key": "kubernetes.io/os", "operator": "In", "values": ["linux"] },
                            { "key": "gpu", "operator": "DoesNotExist" },
                            { "key": "cores", "operator": "Gt", "values": ["4"] }
                        ]
                    }]
                },
                "preferredDuringSchedulingIgnoredDuringExecution": [{
                    "weight": 100,
                    "preference": { "matchExpressions": [{ "key": "zone", "operator": "In", "values": ["east"] }] }
                }]
            },
            "podAntiAffinity": {
                "preferredDuringSchedulingIgnoredDuringExecution": [{
                    "weight": 1,
                    "podAffinityTerm": {
                        "topologyKey": "kubernetes.io/hostname",
                        "labelSelector": { "matchExpressions": [{ "key": "app", "operator": "In", "values": ["spire-server"] }] }
                    }
                }]
            }
        }));
        assert_eq!(validate_affinity(&a), Ok(()));
    }

    #[test]
    fn test_empty_required_terms_rejected() {
        let a = affinity(json!({
            "nodeAffinity": { "requiredDuringSchedulingIgnoredDuringExecution": { "nodeSelectorTerms": [] } }
        }));
        assert!(validate_affinity(&a).unwrap_err().contains("must not be empty"));
    }

    #[test]
    fn test_term_without_requirements_rejected() {
        let a = affinity(json!({
            "nodeAffinity": { "requiredDuringSchedulingIgnoredDuringExecution": { "nodeSelectorTerms": [{}] } }
        }));
        assert!(validate_affinity(&a).is_err());
    }

    #[rstest::rstest]
    #[case::in_without_values("In", json!([]), false)]
    #[case::not_in_with_values("NotIn", json!(["a"]), true)]
    #[case::exists_with_values("Exists", json!(["a"]), false)]
    #[case::does_not_exist("DoesNotExist", json!([]), true)]
    #[case::gt_two_values("Gt", json!(["1", "2"]), false)]
    #[case::lt_one_value("Lt", json!(["1"]), true)]
    #[case::unknown_operator("Near", json!(["a"]), false)]
    fn test_node_operator_value_counts(
        #[case] operator: &str,
        #[case] values: serde_json::Value,
        #[case] valid: bool,
    ) {
        let a = affinity(json!({
            "nodeAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": {
                    "nodeSelectorTerms": [{
                        "matchExpressions": [{ "key": "k", "operator": operator, "values": values }]
                    }]
                }
            }
        }));
        assert_eq!(validate_affinity(&a).is_ok(), valid);
    }

    #[rstest::rstest]
    #[case::zero(0, false)]
    #[case::one(1, true)]
    #[case::hundred(100, true)]
    #[case::over(101, false)]
    fn test_preferred_weight_bounds(#[case] weight: i32, #[case] valid: bool) {
        let a = affinity(json!({
            "nodeAffinity": {
                "preferredDuringSchedulingIgnoredDuringExecution": [{
                    "weight": weight,
                    "preference": { "matchExpressions": [{ "key": "zone", "operator": "Exists" }] }
                }]
            }
        }));
        assert_eq!(validate_affinity(&a).is_ok(), valid);
    }

    #[test]
    fn test_pod_affinity_requires_topology_key() {
        let a = affinity(json!({
            "podAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": [{ "topologyKey": "" }]
            }
        }));
        assert!(validate_affinity(&a).unwrap_err().contains("topologyKey"));
    }

    #[test]
    fn test_label_selector_rejects_node_only_operators() {
        let a = affinity(json!({
            "podAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": [{
                    "topologyKey": "zone",
                    "labelSelector": { "matchExpressions": [{ "key": "rank", "operator": "Gt", "values": ["1"] }] }
                }]
            }
        }));
        assert!(validate_affinity(&a).unwrap_err().contains("unknown operator"));
    }

    #[test]
    fn test_empty_requirement_key_rejected() {
        let a = affinity(json!({
            "podAntiAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": [{
                    "topologyKey": "zone",
                    "namespaceSelector": { "matchExpressions": [{ "key": "", "operator": "Exists" }] }
                }]
            }
        }));
        assert!(validate_affinity(&a).unwrap_err().contains("key must not be empty"));
    }
}
