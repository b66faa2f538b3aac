//! Tool argument access.
//!
//! Arguments arrive as schema-shaped JSON and handlers read them through
//! one of two surfaces: the weakly-typed map with coercing getters, or
//! [`ToolArguments::bind`], which re-encodes the whole map into a handler
//! record for best-effort conversion. Both are first-class; typed binding
//! is the primary surface here.

use crate::core::error::{McpError, McpResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// The arguments of one `tools/call`, held as raw JSON.
///
/// Wire shapes tolerated: a JSON object, a raw fragment that parses to an
/// object, or nothing at all (treated as empty).
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    /// Build from the `arguments` field of `tools/call` params.
    ///
    /// Non-object values are rejected with `InvalidParams`; the engine turns
    /// that into an `is_error` tool result rather than an RPC fault.
    pub fn from_value(raw: Option<Value>) -> McpResult<Self> {
        match raw {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(values)) => Ok(Self { values }),
            Some(Value::String(fragment)) => {
                // A pre-encoded JSON fragment; decode it once more.
                let value: Value = serde_json::from_str(&fragment)
                    .map_err(|e| McpError::invalid_params(format!("arguments fragment: {e}")))?;
                match value {
                    Value::Object(values) => Ok(Self { values }),
                    other => Err(McpError::invalid_params(format!(
                        "arguments must be an object, got {other}"
                    ))),
                }
            }
            Some(other) => Err(McpError::invalid_params(format!(
                "arguments must be an object, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The raw value for a key, if present.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A string argument. Numbers and booleans are rendered rather than
    /// rejected, matching the coercion the weakly-typed surface promises.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// An integer argument; numeric strings parse.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A float argument; numeric strings parse.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A boolean argument; "true"/"false" strings parse.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `get_string` with a fallback.
    pub fn get_string_or(&self, key: &str, fallback: &str) -> String {
        self.get_string(key).unwrap_or_else(|| fallback.to_string())
    }

    /// Deserialize one argument into any owned type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> McpResult<T> {
        let value = self
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| McpError::invalid_params(format!("missing argument {key}")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::invalid_params(format!("argument {key}: {e}")))
    }

    /// The strongly-typed surface: re-encode the whole map and decode it
    /// into the handler's record type.
    ///
    /// Field defaults come from serde (`#[serde(default)]` where the record
    /// wants zero values for missing keys); extra wire fields are ignored.
    pub fn bind<T: DeserializeOwned>(&self) -> McpResult<T> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|e| McpError::invalid_params(format!("bind arguments: {e}")))
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn args(value: Value) -> ToolArguments {
        ToolArguments::from_value(Some(value)).unwrap()
    }

    #[test]
    fn getters_coerce_across_json_types() {
        let a = args(json!({"n": "42", "f": "2.5", "b": "true", "s": 7}));
        assert_eq!(a.get_i64("n"), Some(42));
        assert_eq!(a.get_f64("f"), Some(2.5));
        assert_eq!(a.get_bool("b"), Some(true));
        assert_eq!(a.get_string("s").as_deref(), Some("7"));
    }

    #[test]
    fn fragment_arguments_decode() {
        let a = ToolArguments::from_value(Some(json!(r#"{"k":1}"#))).unwrap();
        assert_eq!(a.get_i64("k"), Some(1));
    }

    #[test]
    fn non_object_arguments_are_invalid_params() {
        match ToolArguments::from_value(Some(json!([1, 2]))) {
            Err(McpError::InvalidParams(_)) => {}
            other => panic!("expected invalid params, got {other:?}"),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Weather {
        city: String,
        #[serde(default)]
        days: u32,
    }

    #[test]
    fn bind_defaults_missing_fields_and_ignores_extras() {
        let a = args(json!({"city": "Oslo", "unit": "C"}));
        let bound: Weather = a.bind().unwrap();
        assert_eq!(
            bound,
            Weather {
                city: "Oslo".to_string(),
                days: 0
            }
        );
    }

    #[test]
    fn bind_failure_is_invalid_params() {
        let a = args(json!({"days": 3}));
        let bound: McpResult<Weather> = a.bind();
        assert!(matches!(bound, Err(McpError::InvalidParams(_))));
    }
}
