//! Wire protocol between callers and the agent.

use ctera_mcp_core::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunToolRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RunToolRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// Tool entry returned by the tool listing.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the parameters object.
    pub parameters: Value,
}

/// Successful result envelope: `{success: true, ...fields}`.
///
/// `fields` is expected to be an object; anything else is placed under
/// `result`.
#[must_use]
pub fn success(fields: Value) -> Value {
    let mut envelope = Map::new();
    envelope.insert("success".to_string(), Value::Bool(true));
    match fields {
        Value::Object(fields) => envelope.extend(fields),
        Value::Null => {}
        other => {
            envelope.insert("result".to_string(), other);
        }
    }
    Value::Object(envelope)
}

/// Failed result envelope: `{success: false, error, kind}`.
#[must_use]
pub fn failure(error: impl ToString, kind: ErrorKind) -> Value {
    serde_json::json!({
        "success": false,
        "error": error.to_string(),
        "kind": kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_merges_fields() {
        let envelope = success(json!({ "sessions": [] }));
        assert_eq!(envelope, json!({ "success": true, "sessions": [] }));
    }

    #[test]
    fn test_success_wraps_scalars() {
        assert_eq!(success(json!(3))["result"], 3);
        assert_eq!(success(Value::Null), json!({ "success": true }));
    }

    #[test]
    fn test_failure_carries_kind() {
        let envelope = failure("Session not found: k", ErrorKind::SessionNotFound);
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"], "Session not found: k");
        assert_eq!(envelope["kind"], "session_not_found");
    }

    #[test]
    fn test_run_request_parameters_default() {
        let request: RunToolRequest =
            serde_json::from_str(r#"{"name":"cterasdk_list_sessions"}"#).unwrap();
        assert_eq!(request.name, "cterasdk_list_sessions");
        assert!(request.parameters.is_empty());
    }
}
