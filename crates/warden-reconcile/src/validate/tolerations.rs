use k8s_openapi::api::core::v1::Toleration;

const OPERATORS: &[&str] = &["Equal", "Exists"];
const EFFECTS: &[&str] = &["NoSchedule", "PreferNoSchedule", "NoExecute"];
const EVICTING_EFFECT: &str = "NoExecute";

/// Validate toleration operators, effects and eviction durations
///
/// An empty operator or effect is treated as unset, as the API server does.
pub fn validate_tolerations(tolerations: &[Toleration]) -> Result<(), String> {
    for (i, t) in tolerations.iter().enumerate() {
        let operator = t.operator.as_deref().filter(|s| !s.is_empty());
        let effect = t.effect.as_deref().filter(|s| !s.is_empty());

        if let Some(op) = operator {
            if !OPERATORS.contains(&op) {
                return Err(format!("toleration {i} has unknown operator '{op}'"));
            }
        }
        if let Some(effect) = effect {
            if !EFFECTS.contains(&effect) {
                return Err(format!("toleration {i} has unknown effect '{effect}'"));
            }
        }
        if t.toleration_seconds.is_some() && effect != Some(EVICTING_EFFECT) {
            return Err(format!(
                "toleration {i} sets tolerationSeconds but effect is not {EVICTING_EFFECT}"
            ));
        }
    }
    Ok(())
}
