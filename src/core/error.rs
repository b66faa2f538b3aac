//! Error types shared across the crate.
//!
//! One enum covers the whole taxonomy: transport framing, protocol faults,
//! flow control, and cancellation. Handler-level failures never appear here;
//! the engine folds those into `CallToolResult { is_error: true, .. }` so
//! clients can render them.

use crate::protocol::types::error_codes;
use thiserror::Error;

/// The crate-wide error type.
#[derive(Error, Debug, Clone)]
pub enum McpError {
    // -- transport framing ---------------------------------------------------
    /// Malformed JSON on the wire.
    #[error("parse error: {0}")]
    Parse(String),

    /// Well-formed JSON that is not a JSON-RPC 2.0 frame.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection-level transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP-level failure on one of the HTTP transports.
    #[error("http error: {0}")]
    Http(String),

    /// I/O failure.
    #[error("i/o error: {0}")]
    Io(String),

    /// Serialization failure outside the dual-schema case.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// URL parsing failure.
    #[error("url error: {0}")]
    Url(String),

    // -- protocol ------------------------------------------------------------
    /// The method is not in the dispatch table.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Params decoded but failed the method's shape requirements.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Request other than `ping` arrived before `notifications/initialized`.
    #[error("server not initialized")]
    NotInitialized,

    /// A tool declared both a builder schema and raw JSON.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    /// The server answered `initialize` with a version this client does not
    /// speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// The peer answered with a JSON-RPC error frame.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    // -- flow control --------------------------------------------------------
    /// A bounded per-session queue rejected a send. The message names the
    /// queue ("notification queue is full", "sampling queue is full").
    #[error("{0}")]
    QueueFull(String),

    /// A reverse request was issued while no session is connected.
    #[error("no active session")]
    NoActiveSession,

    /// The session id on a request matches no registered session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    // -- cancellation and time -----------------------------------------------
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Engine bug or unclassified failure; maps to `-32603`.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used everywhere in the crate.
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// The JSON-RPC error code this error travels under when it becomes an
    /// error reply.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            McpError::Parse(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::SchemaConflict(_) => {
                error_codes::INVALID_PARAMS
            }
            McpError::NotInitialized => error_codes::SERVER_NOT_INITIALIZED,
            McpError::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) | McpError::PromptNotFound(_) => {
                error_codes::INVALID_PARAMS
            }
            McpError::Rpc { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Url(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            McpError::Timeout(err.to_string())
        } else {
            McpError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_taxonomy() {
        assert_eq!(McpError::Parse("x".into()).jsonrpc_code(), -32700);
        assert_eq!(McpError::InvalidRequest("x".into()).jsonrpc_code(), -32600);
        assert_eq!(McpError::MethodNotFound("x".into()).jsonrpc_code(), -32601);
        assert_eq!(McpError::InvalidParams("x".into()).jsonrpc_code(), -32602);
        assert_eq!(McpError::NotInitialized.jsonrpc_code(), -32002);
        assert_eq!(McpError::Internal("x".into()).jsonrpc_code(), -32603);
    }

    #[test]
    fn flow_control_messages_are_stable() {
        assert_eq!(McpError::NoActiveSession.to_string(), "no active session");
        assert_eq!(
            McpError::QueueFull("sampling queue is full".into()).to_string(),
            "sampling queue is full"
        );
    }
}
