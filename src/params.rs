use serde_json::Value;

use crate::Headers;

/// Request parameters: string keys to arbitrary JSON values.
pub type Parameters = serde_json::Map<String, Value>;

/// Resolves the parameters sent with a request.
///
/// An override replaces everything. Otherwise `additional` is merged on top of
/// `base`, new values winning on key collision.
pub fn merge_parameters(
    base: Parameters,
    additional: Option<&Parameters>,
    override_with: Option<&Parameters>,
) -> Parameters {
    if let Some(parameters) = override_with {
        return parameters.clone();
    }
    let mut merged = base;
    if let Some(additional) = additional {
        for (key, value) in additional {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Header counterpart of [`merge_parameters`], matching names
/// case-insensitively.
pub fn merge_headers(
    base: Headers,
    additional: Option<&Headers>,
    override_with: Option<&Headers>,
) -> Headers {
    if let Some(headers) = override_with {
        return headers.clone();
    }
    let mut merged = base;
    if let Some(additional) = additional {
        merged.merge(additional);
    }
    merged
}

/// Flattens parameters into string pairs for query and form encoding.
///
/// Arrays become repeated keys, objects are sent as compact JSON and nulls are
/// dropped.
pub fn query_pairs(parameters: &Parameters) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(parameters.len());
    for (key, value) in parameters {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
