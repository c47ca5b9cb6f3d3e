use serde::Serialize;
use serde_json::{Map, Value};

/// Outcome of comparing one expected key against the observed state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comparison {
    pub key: String,
    pub expected: Value,
    pub actual: Value,
    #[serde(rename = "status")]
    pub matches: bool,
}

/// Compares `actual` against every key of `expected` using exact equality.
///
/// Keys missing from `actual` compare as `null`; keys present only in `actual`
/// are ignored. Results follow the key order of `expected`.
pub fn compare(actual: &Map<String, Value>, expected: &Map<String, Value>) -> Vec<Comparison> {
    expected
        .iter()
        .map(|(key, expected_value)| {
            let actual_value = actual.get(key).cloned().unwrap_or(Value::Null);
            Comparison {
                key: key.clone(),
                matches: &actual_value == expected_value,
                expected: expected_value.clone(),
                actual: actual_value,
            }
        })
        .collect()
}
