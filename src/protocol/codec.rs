//! JSON-RPC frame codec.
//!
//! One frame in, one frame out. Transports hand raw bytes to [`decode`] and
//! feed [`encode`]'s output back to the wire; neither function knows about
//! line endings or HTTP bodies beyond trimming framing whitespace.

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::JsonRpcMessage;

/// Marker emitted by [`crate::protocol::types::Tool`]'s serializer when both
/// schema surfaces are populated; [`encode`] upgrades it to the dedicated
/// schema-conflict error.
pub(crate) const SCHEMA_CONFLICT_MARKER: &str = "both builder and raw input schemas";

/// Serialize a frame to wire bytes.
pub fn encode(message: &JsonRpcMessage) -> McpResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|err| {
        let text = err.to_string();
        if text.contains(SCHEMA_CONFLICT_MARKER) {
            McpError::SchemaConflict(text)
        } else {
            McpError::Serialization(text)
        }
    })
}

/// Parse one frame from wire bytes.
///
/// Syntactically broken JSON yields [`McpError::Parse`]; well-formed JSON
/// that is not a JSON-RPC 2.0 frame yields [`McpError::InvalidRequest`].
/// Trailing CR/LF from line-delimited transports is tolerated.
pub fn decode(raw: &[u8]) -> McpResult<JsonRpcMessage> {
    let value: serde_json::Value = serde_json::from_slice(trim_frame(raw))
        .map_err(|err| McpError::Parse(err.to_string()))?;
    serde_json::from_value(value).map_err(|err| McpError::InvalidRequest(err.to_string()))
}

/// [`decode`] for string input.
pub fn decode_str(raw: &str) -> McpResult<JsonRpcMessage> {
    decode(raw.as_bytes())
}

/// Serialize a typed result or params value to the JSON carried inside a
/// frame, mapping the dual-schema tool failure to its dedicated error.
pub fn encode_value<T: serde::Serialize>(value: &T) -> McpResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| {
        let text = err.to_string();
        if text.contains(SCHEMA_CONFLICT_MARKER) {
            McpError::SchemaConflict(text)
        } else {
            McpError::Serialization(text)
        }
    })
}

fn trim_frame(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &raw[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_id_type_and_meta() {
        let frame = r#"{"jsonrpc":"2.0","id":"abc","method":"tools/call","params":{"name":"t","_meta":{"progressToken":7,"x":"y"}}}"#;
        let message = decode_str(frame).unwrap();
        let encoded = encode(&message).unwrap();
        let reparsed = decode(&encoded).unwrap();
        assert_eq!(message, reparsed);

        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["id"], json!("abc"));
        assert_eq!(value["params"]["_meta"]["progressToken"], json!(7));
        assert_eq!(value["params"]["_meta"]["x"], json!("y"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        match decode_str("{not json") {
            Err(McpError::Parse(_)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn shape_violation_is_invalid_request() {
        match decode_str(r#"{"jsonrpc":"2.0","id":1}"#) {
            Err(McpError::InvalidRequest(_)) => {}
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn crlf_terminated_frames_decode() {
        let message = decode_str("{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\r\n").unwrap();
        assert!(matches!(message, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn dual_schema_tool_fails_encode_with_dedicated_error() {
        let tool = Tool {
            name: "conflicted".to_string(),
            input_schema: Some(InputSchema::default()),
            raw_input_schema: Some(json!({"type": "object"})),
            ..Default::default()
        };
        match encode_value(&vec![tool]) {
            Err(McpError::SchemaConflict(text)) => assert!(text.contains("conflicted")),
            other => panic!("expected schema conflict, got {other:?}"),
        }
    }
}
