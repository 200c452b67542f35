use k8s_openapi::api::core::v1::ResourceRequirements;
use warden_common::quantity::ParsedQuantity;

/// Every resource present in both limits and requests must have limit >= request
///
/// Either map may be absent. Quantities that do not parse are rejected.
pub fn validate_resources(resources: &ResourceRequirements) -> Result<(), String> {
    let (Some(limits), Some(requests)) = (&resources.limits, &resources.requests) else {
        return Ok(());
    };

    for (name, limit) in limits {
        let Some(request) = requests.get(name) else {
            continue;
        };
        let request_value =
            ParsedQuantity::from_quantity(request).map_err(|e| format!("requests.{name}: {e}"))?;
        let limit_value =
            ParsedQuantity::from_quantity(limit).map_err(|e| format!("limits.{name}: {e}"))?;
        if limit_value < request_value {
            return Err(format!(
                "{name} limit {} is less than request {}",
                limit.0, request.0
            ));
        }
    }
    Ok(())
}
