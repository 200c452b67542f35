use std::collections::BTreeMap;

/// Maximum length of a label name segment and of a label value
pub const MAX_LABEL_LENGTH: usize = 63;

/// Validate label keys and values
///
/// A key is `[prefix/]name`: at most one `/`, a non-empty prefix when the
/// slash is present, and a non-empty name of at most 63 characters. Values
/// may be empty but not longer than 63 characters.
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Result<(), String> {
    for (key, value) in labels {
        validate_key(key)?;
        if value.len() > MAX_LABEL_LENGTH {
            return Err(format!(
                "value for '{key}' is {} characters, maximum is {MAX_LABEL_LENGTH}",
                value.len()
            ));
        }
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("label key must not be empty".to_string());
    }
    let name = match key.split_once('/') {
        None => key,
        Some((_, name)) if name.contains('/') => {
            return Err(format!("label key '{key}' has more than one '/'"));
        }
        Some(("", _)) => return Err(format!("label key '{key}' has an empty prefix")),
        Some((_, name)) => name,
    };
    if name.is_empty() {
        return Err(format!("label key '{key}' has an empty name"));
    }
    if name.len() > MAX_LABEL_LENGTH {
        return Err(format!(
            "label key '{key}' name is {} characters, maximum is {MAX_LABEL_LENGTH}",
            name.len()
        ));
    }
    Ok(())
}
