//! Tool abstraction: the handler trait, the registry entry, and the schema
//! builder DSL.
//!
//! A tool's input schema comes from the builder DSL or from raw JSON the
//! caller already has. Declaring both is a conflict the codec rejects at
//! encode time, so a misconfigured tool cannot be advertised.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::core::arguments::ToolArguments;
use crate::core::error::McpResult;
use crate::protocol::types::{CallToolResult, InputSchema, Tool, ToolAnnotations};
use crate::server::context::ToolContext;

/// Implemented by every invokable tool.
///
/// Returning `Err` is an application-level failure: the engine folds it into
/// a `CallToolResult` with `is_error = true` so it reaches the client as
/// renderable data, never as a transport fault.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> McpResult<CallToolResult>;
}

/// Adapter so plain async closures can serve as tools.
pub struct ToolFn<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for ToolFn<F>
where
    F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<CallToolResult>> + Send,
{
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> McpResult<CallToolResult> {
        (self.0)(args, ctx).await
    }
}

/// A tool definition paired with its handler, as stored in the global
/// registry or a session's override table.
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn new<H: ToolHandler + 'static>(tool: Tool, handler: H) -> Self {
        Self {
            tool,
            handler: Arc::new(handler),
        }
    }
}

/// Builder DSL for tool definitions.
///
/// ```
/// use weave_mcp_rs::core::tool::ToolBuilder;
///
/// let tool = ToolBuilder::new("forecast")
///     .description("Weather forecast for a city")
///     .with_string("city", true, "City name")
///     .with_integer("days", false, "Days ahead, default 1")
///     .build();
/// assert_eq!(tool.name, "forecast");
/// ```
#[derive(Debug, Default)]
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    title: Option<String>,
    properties: Map<String, Value>,
    required: Vec<String>,
    raw_schema: Option<Value>,
    output_schema: Option<Value>,
    annotations: Option<ToolAnnotations>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn property(mut self, name: &str, required: bool, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn with_string(self, name: &str, required: bool, description: &str) -> Self {
        self.property(
            name,
            required,
            json!({"type": "string", "description": description}),
        )
    }

    pub fn with_number(self, name: &str, required: bool, description: &str) -> Self {
        self.property(
            name,
            required,
            json!({"type": "number", "description": description}),
        )
    }

    pub fn with_integer(self, name: &str, required: bool, description: &str) -> Self {
        self.property(
            name,
            required,
            json!({"type": "integer", "description": description}),
        )
    }

    pub fn with_boolean(self, name: &str, required: bool, description: &str) -> Self {
        self.property(
            name,
            required,
            json!({"type": "boolean", "description": description}),
        )
    }

    pub fn with_string_enum(
        self,
        name: &str,
        required: bool,
        description: &str,
        values: &[&str],
    ) -> Self {
        self.property(
            name,
            required,
            json!({"type": "string", "description": description, "enum": values}),
        )
    }

    pub fn with_array(self, name: &str, required: bool, description: &str, items: Value) -> Self {
        self.property(
            name,
            required,
            json!({"type": "array", "description": description, "items": items}),
        )
    }

    /// Attach an arbitrary property schema.
    pub fn with_property(self, name: &str, required: bool, schema: Value) -> Self {
        self.property(name, required, schema)
    }

    /// Supply the input schema as raw JSON instead of through the DSL.
    /// Combining this with any `with_*` property produces a tool the codec
    /// refuses to encode.
    pub fn with_raw_schema(mut self, schema: Value) -> Self {
        self.raw_schema = Some(schema);
        self
    }

    /// Advertise a structured-content contract for results.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn build(self) -> Tool {
        let input_schema = if self.properties.is_empty() && self.required.is_empty() {
            // Raw-only tools carry no DSL schema at all; a bare tool gets
            // the empty object schema when it serializes.
            if self.raw_schema.is_some() {
                None
            } else {
                Some(InputSchema::default())
            }
        } else {
            Some(InputSchema {
                schema_type: "object".to_string(),
                properties: Some(self.properties),
                required: if self.required.is_empty() {
                    None
                } else {
                    Some(self.required)
                },
                extra: Map::new(),
            })
        };

        Tool {
            name: self.name,
            description: self.description,
            title: self.title,
            input_schema,
            raw_input_schema: self.raw_schema,
            output_schema: self.output_schema,
            annotations: self.annotations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_properties_and_required() {
        let tool = ToolBuilder::new("forecast")
            .description("Weather forecast")
            .with_string("city", true, "City name")
            .with_integer("days", false, "Days ahead")
            .build();

        let schema = tool.input_schema.as_ref().unwrap();
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties["city"]["type"], json!("string"));
        assert_eq!(properties["days"]["type"], json!("integer"));
        assert_eq!(schema.required.as_deref(), Some(&["city".to_string()][..]));
    }

    #[test]
    fn bare_tool_serializes_with_empty_object_schema() {
        let tool = ToolBuilder::new("noop").build();
        let encoded = serde_json::to_value(&tool).unwrap();
        assert_eq!(encoded["inputSchema"]["type"], json!("object"));
    }

    #[test]
    fn raw_schema_passes_through_verbatim() {
        let raw = json!({"type": "object", "properties": {"q": {"type": "string"}}, "$schema": "x"});
        let tool = ToolBuilder::new("search").with_raw_schema(raw.clone()).build();
        let encoded = serde_json::to_value(&tool).unwrap();
        assert_eq!(encoded["inputSchema"], raw);
    }

    #[test]
    fn dsl_plus_raw_is_a_conflict() {
        let tool = ToolBuilder::new("broken")
            .with_string("a", false, "a")
            .with_raw_schema(json!({"type": "object"}))
            .build();
        assert!(tool.has_schema_conflict());
    }
}
