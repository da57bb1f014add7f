//! Dynamic parameter maps
//!
//! Parameters, shared execution context, and task output are all opaque
//! string-keyed JSON maps. The engine never interprets their values; it only
//! merges them and moves them across the process boundary as JSON.

use serde_json::{Map, Value};

/// String-keyed bag of JSON values.
pub type Params = Map<String, Value>;

/// Merge `overrides` over `base` into a fresh map.
///
/// Key collisions resolve in favor of `overrides`; this is the rule that
/// makes step params win over inherited context.
pub fn merge(base: &Params, overrides: &Params) -> Params {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Parse a serialized parameter map, treating an empty document as `{}`.
///
/// Non-object documents are rejected; the opaque-map contract only admits
/// JSON objects at the top level.
pub fn from_json_str(raw: &str) -> Result<Params, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Params::new());
    }
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(serde::de::Error::custom(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_merge_overrides_win() {
        let base = map(json!({"region": "eu", "depth": 1}));
        let overrides = map(json!({"depth": 2}));

        let merged = merge(&base, &overrides);
        assert_eq!(merged["region"], json!("eu"));
        assert_eq!(merged["depth"], json!(2));
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let base = map(json!({"a": 1}));
        let overrides = map(json!({"b": 2}));
        let merged = merge(&base, &overrides);

        assert_eq!(merged.len(), 2);
        assert_eq!(base.len(), 1);
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn test_from_json_str_empty_is_empty_map() {
        assert!(from_json_str("").unwrap().is_empty());
        assert!(from_json_str("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_from_json_str_rejects_non_objects() {
        assert!(from_json_str("[1, 2]").is_err());
        assert!(from_json_str("\"text\"").is_err());
    }
}
