//! Tool server trait and descriptor types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A callable tool as offered to the completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's parameters.
    pub parameters: serde_json::Value,
    /// Server that executes this tool.
    pub server_id: String,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            server_id: server_id.into(),
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Build a descriptor from one raw listing entry.
    ///
    /// Accepts `parameters`, `inputSchema` or `input_schema` for the schema.
    /// Returns `None` when the name or schema is missing.
    pub fn from_declaration(server_id: &str, entry: &serde_json::Value) -> Option<Self> {
        let name = entry
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())?;
        let parameters = ["parameters", "inputSchema", "input_schema"]
            .iter()
            .find_map(|key| entry.get(*key).filter(|v| v.is_object()))?;
        let description = entry
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: parameters.clone(),
            server_id: server_id.to_string(),
        })
    }
}

/// A tool-execution server.
///
/// The wire protocol is the implementor's concern; the orchestrator only
/// lists tools, calls them, and asks the server to interpret raw results.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Server identifier, as referenced by tool descriptors and approval policy.
    fn id(&self) -> &str;

    /// Raw tool declarations. Entries may be malformed.
    async fn list_tools(&self) -> Result<Vec<serde_json::Value>, ToolError>;

    /// Invoke a tool and return its raw result.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;

    /// Turn a raw result into a success payload or a diagnostic.
    ///
    /// Servers with their own result envelope override this.
    fn interpret_result(&self, raw: serde_json::Value) -> Result<serde_json::Value, String> {
        interpret_envelope(raw)
    }
}

/// Default result interpretation.
///
/// - `{"success": true, "data": ..}` yields `data` (or null when absent).
/// - `{"success": false, "error": ..}` and `{"isError": true, ..}` are failures.
/// - Anything else, including null, `""` and `[]`, is a successful payload.
pub fn interpret_envelope(raw: serde_json::Value) -> Result<serde_json::Value, String> {
    let Some(obj) = raw.as_object() else {
        return Ok(raw);
    };

    if let Some(success) = obj.get("success").and_then(|s| s.as_bool()) {
        if success {
            return Ok(obj.get("data").cloned().unwrap_or(serde_json::Value::Null));
        }
        return Err(error_text(obj.get("error")));
    }

    if obj.get("isError").and_then(|e| e.as_bool()) == Some(true) {
        return Err(error_text(obj.get("content").or_else(|| obj.get("error"))));
    }

    Ok(raw)
}

fn error_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Null) | None => "Tool reported failure".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Lenient runtime validation of a tool's parameter schema.
///
/// Catches structural mistakes (missing `"type": "object"`, orphan
/// `"required"` keys, arrays without `"items"`) without rejecting
/// intentional freeform properties.
///
/// Returns a list of validation errors. An empty list means the schema is valid.
///
/// # Rules enforced
///
/// 1. Top-level must have `"type": "object"`
/// 2. Top-level must have `"properties"` as an object
/// 3. Every key in `"required"` must exist in `"properties"`
/// 4. Nested objects follow the same rules recursively
/// 5. Array properties should have `"items"` defined
///
/// Properties without a `"type"` field are allowed (freeform/any-type).
pub fn validate_tool_schema(schema: &serde_json::Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();

    // Rule 1: must have "type": "object" at this level
    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        Some(other) => {
            errors.push(format!("{path}: expected type \"object\", got \"{other}\""));
            return errors;
        }
        None => {
            errors.push(format!("{path}: missing \"type\": \"object\""));
            return errors;
        }
    }

    // Rule 2: must have "properties" as an object
    let properties = match schema.get("properties").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => {
            errors.push(format!("{path}: missing or non-object \"properties\""));
            return errors;
        }
    };

    // Rule 3: every key in "required" must exist in "properties"
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str()
                && !properties.contains_key(key)
            {
                errors.push(format!(
                    "{path}: required key \"{key}\" not found in properties"
                ));
            }
        }
    }

    // Rule 4 & 5: recurse into nested objects and check arrays
    for (key, prop) in properties {
        let prop_path = format!("{path}.{key}");
        match prop.get("type").and_then(|t| t.as_str()) {
            Some("object") => errors.extend(validate_tool_schema(prop, &prop_path)),
            Some("array") => match prop.get("items") {
                Some(items) if items.get("type").and_then(|t| t.as_str()) == Some("object") => {
                    errors.extend(validate_tool_schema(items, &format!("{prop_path}.items")));
                }
                Some(_) => {}
                None => errors.push(format!("{prop_path}: array property missing \"items\"")),
            },
            _ => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_declaration() {
        let entry = serde_json::json!({
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        });
        let desc = ToolDescriptor::from_declaration("fs", &entry).unwrap();
        assert_eq!(desc.name, "read_file");
        assert_eq!(desc.server_id, "fs");
        assert_eq!(desc.parameters["properties"]["path"]["type"], "string");
    }

    #[test]
    fn test_descriptor_rejects_missing_name_or_schema() {
        let no_name = serde_json::json!({"parameters": {"type": "object"}});
        let blank_name = serde_json::json!({"name": "  ", "parameters": {"type": "object"}});
        let no_schema = serde_json::json!({"name": "x"});
        let bad_schema = serde_json::json!({"name": "x", "parameters": "object"});
        for entry in [no_name, blank_name, no_schema, bad_schema] {
            assert!(ToolDescriptor::from_declaration("s", &entry).is_none());
        }
    }

    #[test]
    fn test_envelope_success_unwraps_data() {
        let raw = serde_json::json!({"success": true, "data": {"rows": 2}});
        assert_eq!(interpret_envelope(raw).unwrap(), serde_json::json!({"rows": 2}));
    }

    #[test]
    fn test_envelope_failure_reports_error() {
        let raw = serde_json::json!({"success": false, "error": "disk full"});
        assert_eq!(interpret_envelope(raw).unwrap_err(), "disk full");

        let raw = serde_json::json!({"success": false});
        assert_eq!(interpret_envelope(raw).unwrap_err(), "Tool reported failure");

        let raw = serde_json::json!({"isError": true, "content": [{"text": "boom"}]});
        assert!(interpret_envelope(raw).unwrap_err().contains("boom"));
    }

    #[test]
    fn test_empty_payloads_are_success() {
        for raw in [
            serde_json::Value::Null,
            serde_json::json!(""),
            serde_json::json!([]),
            serde_json::json!({"success": true}),
        ] {
            assert!(interpret_envelope(raw).is_ok());
        }
    }

    #[test]
    fn test_validate_schema_valid() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "A name" }
            },
            "required": ["name"]
        });
        let errors = validate_tool_schema(&schema, "test");
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_validate_schema_missing_type() {
        let schema = serde_json::json!({
            "properties": {
                "name": { "type": "string" }
            }
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing \"type\": \"object\""));
    }

    #[test]
    fn test_validate_schema_required_not_in_properties() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" }
            },
            "required": ["name", "age"]
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"age\" not found in properties"));
    }

    #[test]
    fn test_validate_schema_nested_array_items() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array" },
                "rows": {
                    "type": "array",
                    "items": {"type": "object", "properties": {}, "required": ["id"]}
                }
            }
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("test.tags")));
        assert!(errors.iter().any(|e| e.contains("test.rows.items")));
    }
}
