//! Cross-layer protocol properties exercised through the public API.

use serde_json::json;
use weave_mcp_rs::prelude::*;
use weave_mcp_rs::protocol::{codec, JsonRpcMessage};

#[test]
fn wire_round_trip_preserves_everything_observable() {
    let frames = [
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":"str-id","method":"tools/call","params":{"name":"t","arguments":{"a":1},"_meta":{"progressToken":"123","vendor":true}}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"progressToken":7,"progress":0.5}}"#,
        r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"hi"},{"type":"hologram","x":1}]}}"#,
        r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"method not found: nope"}}"#,
    ];

    for frame in frames {
        let decoded = codec::decode_str(frame).unwrap();
        let encoded = codec::encode(&decoded).unwrap();
        let redecoded = codec::decode(&encoded).unwrap();
        assert_eq!(decoded, redecoded, "{frame}");

        let original: serde_json::Value = serde_json::from_str(frame).unwrap();
        let rewritten: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(original, rewritten, "{frame}");
    }
}

#[test]
fn ids_of_different_json_types_stay_distinct() {
    let numeric = codec::decode_str(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
    let textual = codec::decode_str(r#"{"jsonrpc":"2.0","id":"7","method":"ping"}"#).unwrap();
    match (numeric, textual) {
        (JsonRpcMessage::Request(a), JsonRpcMessage::Request(b)) => {
            assert_ne!(a.id, b.id);
        }
        _ => unreachable!(),
    }
}

#[test]
fn dsl_and_raw_schema_together_fail_encode() {
    let tool = ToolBuilder::new("conflicted")
        .with_string("a", true, "a")
        .with_raw_schema(json!({"type": "object"}))
        .build();
    let result = ListToolsResult {
        tools: vec![tool],
        next_cursor: None,
    };
    match codec::encode_value(&result) {
        Err(McpError::SchemaConflict(message)) => assert!(message.contains("conflicted")),
        other => panic!("expected schema conflict, got {other:?}"),
    }
}

#[test]
fn structured_result_carries_fallback_and_object() {
    let result = CallToolResult::structured(json!({"temp_c": 21.5}), "21.5 degrees");
    let encoded = serde_json::to_value(&result).unwrap();
    assert_eq!(encoded["structuredContent"]["temp_c"], json!(21.5));
    assert_eq!(encoded["content"][0]["text"], json!("21.5 degrees"));
    assert!(encoded.get("isError").is_none());
}
