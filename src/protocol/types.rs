//! Core wire types for the Model Context Protocol.
//!
//! Everything that crosses a transport boundary is defined here: the four
//! JSON-RPC message kinds, the polymorphic request id, the `_meta` envelope,
//! content blocks, and the tool/resource/prompt shapes. Serde attributes pin
//! the camelCase wire names; the handful of manual `Serialize`/`Deserialize`
//! impls exist where the wire format cannot be expressed with derives alone
//! (open content variants, the dual-schema tool).

use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// JSON-RPC protocol version carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Most recent protocol revision this crate implements.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions the server will echo back during negotiation. A client
/// requesting anything else is answered with [`LATEST_PROTOCOL_VERSION`].
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// HTTP header carrying the session id on the Streamable HTTP transport.
pub const HEADER_SESSION_ID: &str = "Mcp-Session-Id";

/// HTTP header carrying the negotiated protocol version after `initialize`.
pub const HEADER_PROTOCOL_VERSION: &str = "Mcp-Protocol-Version";

// ============================================================================
// Request id
// ============================================================================

/// A JSON-RPC request id: an integer or a string.
///
/// The two variants never compare equal and the original JSON type is
/// preserved on the wire, so a server answering `"id": "7"` with `"id": 7`
/// is impossible to express.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn as_value(&self) -> Value {
        match self {
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::from(s.clone()),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A progress token from a request's `_meta`, string or integer like the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    Number(i64),
    String(String),
}

impl From<i64> for ProgressToken {
    fn from(value: i64) -> Self {
        ProgressToken::Number(value)
    }
}

impl From<&str> for ProgressToken {
    fn from(value: &str) -> Self {
        ProgressToken::String(value.to_string())
    }
}

// ============================================================================
// Meta envelope
// ============================================================================

/// The free-form `_meta` object a request's params may carry.
///
/// `progressToken` is the only field with protocol meaning; everything else
/// rides along untouched so unknown keys survive a decode/encode round-trip.
/// An empty `Meta` serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Meta {
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress_token<T: Into<ProgressToken>>(token: T) -> Self {
        Self {
            progress_token: Some(token.into()),
            extra: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.progress_token.is_none() && self.extra.is_empty()
    }
}

// ============================================================================
// JSON-RPC frames
// ============================================================================

/// A request: carries an id and expects exactly one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new<I: Into<RequestId>>(id: I, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }
}

/// A notification: no id, no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// A successful reply carrying `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// The error object inside an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An error reply. `id` is absent when the request id could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub error: ErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: ErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

/// Any decoded JSON-RPC frame. The kind is selected by which fields are
/// present: `method` + `id` = request, `method` alone = notification,
/// `result` = response, `error` = error.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// The id of the frame, when it has one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Notification(_) => None,
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Error(e) => e.id.as_ref(),
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(
            self,
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_)
        )
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcMessage::Request(m) => m.serialize(serializer),
            JsonRpcMessage::Notification(m) => m.serialize(serializer),
            JsonRpcMessage::Response(m) => m.serialize(serializer),
            JsonRpcMessage::Error(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let object = value
            .as_object()
            .ok_or_else(|| D::Error::custom("JSON-RPC frame must be an object"))?;

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(D::Error::custom("missing or invalid jsonrpc version"));
        }

        let message = if object.contains_key("method") {
            if object.get("id").map(|id| !id.is_null()).unwrap_or(false) {
                JsonRpcMessage::Request(
                    serde_json::from_value(value).map_err(D::Error::custom)?,
                )
            } else {
                JsonRpcMessage::Notification(
                    serde_json::from_value(value).map_err(D::Error::custom)?,
                )
            }
        } else if object.contains_key("result") {
            JsonRpcMessage::Response(serde_json::from_value(value).map_err(D::Error::custom)?)
        } else if object.contains_key("error") {
            JsonRpcMessage::Error(serde_json::from_value(value).map_err(D::Error::custom)?)
        } else {
            return Err(D::Error::custom(
                "frame has neither method, result, nor error",
            ));
        };

        Ok(message)
    }
}

// ============================================================================
// Error codes
// ============================================================================

/// JSON-RPC and MCP error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Request other than `ping` arrived before `notifications/initialized`.
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    /// `resources/read` named a URI no resource or template matches.
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
}

// ============================================================================
// Roles and annotations
// ============================================================================

/// Who a piece of content is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Display hints attached to content blocks and resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

// ============================================================================
// Content blocks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioContent {
    /// Base64-encoded audio bytes.
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedResource {
    pub resource: ResourceContents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLinkContent {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// One element of a tool result's or prompt message's content list.
///
/// The `Unknown` case keeps the raw value of any unrecognized `"type"` so
/// payloads from newer peers pass through instead of failing decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(TextContent),
    Image(ImageContent),
    Audio(AudioContent),
    Resource(EmbeddedResource),
    ResourceLink(ResourceLinkContent),
    Unknown(Value),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(TextContent {
            text: text.into(),
            annotations: None,
            meta: None,
        })
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Content::Image(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
            annotations: None,
            meta: None,
        })
    }

    pub fn audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Content::Audio(AudioContent {
            data: data.into(),
            mime_type: mime_type.into(),
            annotations: None,
            meta: None,
        })
    }

    pub fn embedded_resource(resource: ResourceContents) -> Self {
        Content::Resource(EmbeddedResource {
            resource,
            annotations: None,
            meta: None,
        })
    }

    pub fn resource_link(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Content::ResourceLink(ResourceLinkContent {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            size: None,
            annotations: None,
        })
    }

    fn type_name(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Image(_) => "image",
            Content::Audio(_) => "audio",
            Content::Resource(_) => "resource",
            Content::ResourceLink(_) => "resource_link",
            Content::Unknown(_) => "",
        }
    }

    /// The text of a `Text` block, if that is what this is.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(c) => Some(&c.text),
            _ => None,
        }
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = match self {
            Content::Text(c) => serde_json::to_value(c),
            Content::Image(c) => serde_json::to_value(c),
            Content::Audio(c) => serde_json::to_value(c),
            Content::Resource(c) => serde_json::to_value(c),
            Content::ResourceLink(c) => serde_json::to_value(c),
            Content::Unknown(raw) => return raw.serialize(serializer),
        }
        .map_err(S::Error::custom)?;

        if let Value::Object(ref mut map) = value {
            map.insert("type".to_string(), Value::from(self.type_name()));
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let content = match kind.as_str() {
            "text" => Content::Text(serde_json::from_value(value).map_err(D::Error::custom)?),
            "image" => Content::Image(serde_json::from_value(value).map_err(D::Error::custom)?),
            "audio" => Content::Audio(serde_json::from_value(value).map_err(D::Error::custom)?),
            "resource" => {
                Content::Resource(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            "resource_link" => {
                Content::ResourceLink(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            _ => Content::Unknown(value),
        };
        Ok(content)
    }
}

/// Contents of a read resource: textual or binary, selected by which field
/// is present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Base64-encoded bytes.
        blob: String,
    },
}

impl ResourceContents {
    pub fn uri(&self) -> &str {
        match self {
            ResourceContents::Text { uri, .. } => uri,
            ResourceContents::Blob { uri, .. } => uri,
        }
    }

    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        ResourceContents::Text {
            uri: uri.into(),
            mime_type: None,
            text: text.into(),
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Behavior hints attached to a tool. All of these are hints, never
/// guarantees; clients must not trust them from unknown servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// A tool input/output schema assembled by the builder DSL: always an
/// object schema with optional properties and required names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
            extra: Map::new(),
        }
    }
}

/// A tool as advertised by `tools/list`.
///
/// The input schema comes from exactly one of two places: the builder DSL
/// (`input_schema`) or caller-supplied raw JSON (`raw_input_schema`).
/// Serializing a tool with both populated fails with a schema-conflict
/// error rather than silently preferring one.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<InputSchema>,
    #[serde(skip)]
    pub raw_input_schema: Option<Value>,
    #[serde(rename = "outputSchema", default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// True when both schema surfaces are populated, which `encode` rejects.
    pub fn has_schema_conflict(&self) -> bool {
        self.input_schema.is_some() && self.raw_input_schema.is_some()
    }
}

impl Serialize for Tool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.has_schema_conflict() {
            return Err(S::Error::custom(format!(
                "tool {}: both builder and raw input schemas are set",
                self.name
            )));
        }

        let mut map = Map::new();
        map.insert("name".to_string(), Value::from(self.name.clone()));
        if let Some(description) = &self.description {
            map.insert("description".to_string(), Value::from(description.clone()));
        }
        if let Some(title) = &self.title {
            map.insert("title".to_string(), Value::from(title.clone()));
        }

        let schema = if let Some(raw) = &self.raw_input_schema {
            raw.clone()
        } else if let Some(schema) = &self.input_schema {
            serde_json::to_value(schema).map_err(S::Error::custom)?
        } else {
            serde_json::to_value(InputSchema::default()).map_err(S::Error::custom)?
        };
        map.insert("inputSchema".to_string(), schema);

        if let Some(output) = &self.output_schema {
            map.insert("outputSchema".to_string(), output.clone());
        }
        if let Some(annotations) = &self.annotations {
            map.insert(
                "annotations".to_string(),
                serde_json::to_value(annotations).map_err(S::Error::custom)?,
            );
        }

        Value::Object(map).serialize(serializer)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// What a tool call produced.
///
/// Handler failures surface here as `is_error = true` with a text content
/// carrying the message; they are data for the client to render, not
/// transport faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            ..Default::default()
        }
    }

    /// A result carrying both the machine-readable object and its
    /// human-readable fallback rendering.
    pub fn structured(value: Value, fallback: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(fallback)],
            structured_content: Some(value),
            ..Default::default()
        }
    }
}

// ============================================================================
// Resources and prompts
// ============================================================================

/// A concrete resource as advertised by `resources/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            size: None,
            annotations: None,
        }
    }
}

/// A parameterized resource: the `uri_template` is an RFC 6570 subset whose
/// captured variables become arguments to the read handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// One declared argument of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A prompt as advertised by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

impl Prompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: None,
        }
    }
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

// ============================================================================
// Capabilities and implementation info
// ============================================================================

/// Name/version pair identifying a client or server implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourcesCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PromptsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoggingCapability {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SamplingCapability {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompletionsCapability {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RootsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// What the server advertises in its `initialize` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// What the client advertises in `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

// ============================================================================
// Logging
// ============================================================================

/// RFC 5424 severity levels, least to most severe. Ordering derives from
/// declaration order, so `LoggingLevel::Warning >= LoggingLevel::Info`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

// ============================================================================
// Sampling
// ============================================================================

/// One turn of the conversation a server asks the client to complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: Content,
}

/// Hint at a model family for sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Server preferences for the model the client should pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    #[serde(
        rename = "intelligencePriority",
        skip_serializing_if = "Option::is_none"
    )]
    pub intelligence_priority: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_preserves_json_type() {
        let numeric: RequestId = serde_json::from_value(json!(7)).unwrap();
        let textual: RequestId = serde_json::from_value(json!("7")).unwrap();
        assert_ne!(numeric, textual);
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!(7));
        assert_eq!(serde_json::to_value(&textual).unwrap(), json!("7"));
    }

    #[test]
    fn empty_meta_encodes_as_empty_object() {
        let meta = Meta::new();
        assert_eq!(serde_json::to_value(&meta).unwrap(), json!({}));
    }

    #[test]
    fn meta_round_trips_progress_token_and_extras() {
        let raw = json!({"progressToken": "123", "vendor": {"k": 1}});
        let meta: Meta = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.progress_token, Some(ProgressToken::from("123")));
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }

    #[test]
    fn message_kind_selected_by_fields() {
        let request: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request(_)));

        let notification: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(matches!(notification, JsonRpcMessage::Notification(_)));

        let response: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {}})).unwrap();
        assert!(matches!(response, JsonRpcMessage::Response(_)));

        let error: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "nope"}}),
        )
        .unwrap();
        assert!(matches!(error, JsonRpcMessage::Error(_)));
    }

    #[test]
    fn unknown_content_type_decodes_to_envelope() {
        let raw = json!({"type": "video", "data": "...", "mimeType": "video/mp4"});
        let content: Content = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(content, Content::Unknown(_)));
        assert_eq!(serde_json::to_value(&content).unwrap(), raw);
    }

    #[test]
    fn content_list_order_survives_round_trip() {
        let list = vec![
            Content::text("a"),
            Content::image("aGk=", "image/png"),
            Content::text("b"),
        ];
        let encoded = serde_json::to_value(&list).unwrap();
        let decoded: Vec<Content> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn tool_with_both_schemas_fails_serialize() {
        let tool = Tool {
            name: "broken".to_string(),
            input_schema: Some(InputSchema::default()),
            raw_input_schema: Some(json!({"type": "object"})),
            ..Default::default()
        };
        let err = serde_json::to_value(&tool).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn call_tool_result_omits_false_is_error() {
        let encoded = serde_json::to_value(CallToolResult::text("ok")).unwrap();
        assert!(encoded.get("isError").is_none());

        let encoded = serde_json::to_value(CallToolResult::error("boom")).unwrap();
        assert_eq!(encoded["isError"], json!(true));
    }

    #[test]
    fn logging_levels_order_by_severity() {
        assert!(LoggingLevel::Debug < LoggingLevel::Info);
        assert!(LoggingLevel::Warning < LoggingLevel::Emergency);
        assert_eq!(
            serde_json::to_value(LoggingLevel::Warning).unwrap(),
            json!("warning")
        );
    }
}
