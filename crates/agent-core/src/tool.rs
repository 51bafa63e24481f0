//! Tool System
//!
//! Tools are declared by a [`ToolSchema`], registered once under a unique name
//! and invoked by the [`ToolDispatcher`](crate::dispatch::ToolDispatcher) when
//! the model requests them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::Message;

/// Tool call request emitted by the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique within the assistant turn that issued it
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from a JSON object literal; non-object values yield no arguments.
    pub fn from_json(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        Self::new(id, name, arguments)
    }

    /// Get an argument as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Get an argument as an unsigned integer
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.arguments.get(key).and_then(Value::as_u64)
    }
}

/// Outcome of one tool invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this result answers
    pub tool_call_id: String,

    /// Tool that was called
    pub name: String,

    /// Success payload or error description
    pub content: String,

    /// Whether this result describes a failure
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: error.into(),
            is_error: true,
        }
    }

    /// Convert into the tool-role turn appended to the conversation
    pub fn into_message(self) -> Message {
        Message::tool_result(self.tool_call_id, self.content, self.is_error)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// JSON Schema object describing the arguments
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut property = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                property["enum"] = Value::Array(values.clone());
            }
            if let Some(default) = &param.default {
                property["default"] = default.clone();
            }
            properties.insert(param.name.clone(), property);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check the schema is well formed: usable name, unique parameter names
    pub fn check(&self) -> Result<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(AgentError::ToolValidation(format!(
                "Invalid tool name: '{}'",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(AgentError::ToolValidation(format!(
                    "Duplicate parameter '{}' in tool '{}'",
                    param.name, self.name
                )));
            }
        }

        Ok(())
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool; the returned text becomes the tool result content
    async fn execute(&self, call: &ToolCall) -> Result<String>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            match call.arguments.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(AgentError::ToolValidation(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(AgentError::ToolValidation(format!(
                                "Parameter '{}' must be one of {}",
                                param.name,
                                Value::Array(allowed.clone())
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools
///
/// Names are checked when a tool is registered, so lookups at call time only
/// ever fail for names the model invented.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let schema = tool.schema();
        schema.check()?;

        if self.tools.contains_key(&schema.name) {
            return Err(AgentError::ToolValidation(format!(
                "Tool '{}' is already registered",
                schema.name
            )));
        }

        tracing::debug!(tool = %schema.name, "Registered tool");
        self.tools
            .insert(schema.name.clone(), RegisteredTool { schema, tool });
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry.tool))
    }

    /// Schemas of all registered tools, ordered by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|entry| entry.schema.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the text back".into(),
                parameters: vec![
                    ParameterSchema::required("text", "string", "Text to echo"),
                    ParameterSchema {
                        enum_values: Some(vec![json!("upper"), json!("lower")]),
                        ..ParameterSchema::optional("case", "string", "Output case")
                    },
                ],
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            Ok(call.get_str("text").unwrap_or_default().to_string())
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.0.into(),
                description: String::new(),
                parameters: vec![],
            }
        }

        async fn execute(&self, _call: &ToolCall) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry.register(NamedTool("alpha")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["alpha", "echo"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let err = registry.register(EchoTool).unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(NamedTool("")).is_err());
        assert!(registry.register(NamedTool("has space")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_validate_required_and_enum() {
        let tool = EchoTool;
        let missing = ToolCall::from_json("1", "echo", json!({}));
        assert!(tool.validate(&missing).is_err());

        let bad_enum = ToolCall::from_json("2", "echo", json!({"text": "hi", "case": "title"}));
        assert!(tool.validate(&bad_enum).is_err());

        let ok = ToolCall::from_json("3", "echo", json!({"text": "hi", "case": "upper"}));
        assert!(tool.validate(&ok).is_ok());
    }

    #[test]
    fn test_parameters_json() {
        let schema = EchoTool.schema().parameters_json();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["text"]["type"], "string");
        assert_eq!(schema["properties"]["case"]["enum"], json!(["upper", "lower"]));
        assert_eq!(schema["required"], json!(["text"]));
    }

    #[test]
    fn test_result_into_message() {
        let message = ToolResult::failure("call_1", "echo", "boom").into_message();
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert!(message.is_error);
        assert_eq!(message.text(), "boom");
    }
}
