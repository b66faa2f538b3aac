//! Streamable HTTP transport, driven over a real socket with raw HTTP so
//! the status codes, headers, and body shapes are asserted exactly as a
//! foreign client would see them.

#![cfg(feature = "http")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use weave_mcp_rs::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_server(
    server: Arc<McpServer>,
    config: StreamableHttpServerConfig,
) -> (String, tokio::task::JoinHandle<()>) {
    init_tracing();
    let transport = StreamableHttpServerTransport::with_config(server, config);
    let router = transport.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/mcp"), handle)
}

fn init_frame() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "clientInfo": {"name": "c", "version": "1"}
        }
    })
}

async fn initialize(url: &str, http: &reqwest::Client) -> String {
    let response = http
        .post(url)
        .header("Content-Type", "application/json")
        .json(&init_frame())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let session = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();

    let accepted = http
        .post(url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 202);

    session
}

fn streaming_server() -> Arc<McpServer> {
    let server = Arc::new(McpServer::new("stream-test", "1.0"));
    server
}

async fn add_streaming_tool(server: &Arc<McpServer>) {
    server
        .add_tool(
            ToolBuilder::new("sseTool").build(),
            ToolFn(|_args: ToolArguments, ctx: ToolContext| async move {
                for i in 0..10 {
                    let _ = ctx.send_notification(
                        "notifications/progress",
                        Some(json!({"value": i})),
                    );
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(CallToolResult::text("done"))
            }),
        )
        .await;
}

async fn add_plain_tool(server: &Arc<McpServer>) {
    server
        .add_tool(
            ToolBuilder::new("plain").build(),
            ToolFn(|_args: ToolArguments, _ctx: ToolContext| async move {
                Ok(CallToolResult::text("quiet"))
            }),
        )
        .await;
}

#[tokio::test]
async fn initialize_negotiates_version_and_mints_session() {
    let (url, _server_task) =
        spawn_server(streaming_server(), StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&init_frame())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let session = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session.is_empty());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], json!("2025-03-26"));
}

#[tokio::test]
async fn unknown_session_id_is_rejected() {
    let (url, _server_task) =
        spawn_server(streaming_server(), StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", "dummy")
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn invalid_content_type_is_rejected() {
    let (url, _server_task) =
        spawn_server(streaming_server(), StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .header("Content-Type", "text/plain")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert!(body.contains("Invalid content type"), "{body}");
}

#[tokio::test]
async fn malformed_json_is_rejected_with_jsonrpc_body() {
    let (url, _server_task) =
        spawn_server(streaming_server(), StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .body("{invalid json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert!(body.contains("jsonrpc"), "{body}");
    assert!(body.contains("not valid json"), "{body}");
}

#[tokio::test]
async fn quiet_tool_call_returns_plain_json() {
    let server = streaming_server();
    add_plain_tool(&server).await;
    let (url, _server_task) =
        spawn_server(server, StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();
    let session = initialize(&url, &http).await;

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "plain"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("Content-Type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("application/json"), "{content_type}");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["content"][0]["text"], json!("quiet"));
}

#[tokio::test]
async fn streaming_tool_call_returns_ordered_events_then_response() {
    let server = streaming_server();
    add_streaming_tool(&server).await;
    let (url, _server_task) =
        spawn_server(server, StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();
    let session = initialize(&url, &http).await;

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "sseTool"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("Content-Type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let body = response.text().await.unwrap();
    let frames: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(frames.len(), 11, "{body}");

    for (i, frame) in frames[..10].iter().enumerate() {
        let value: Value = serde_json::from_str(frame).unwrap();
        assert_eq!(value["params"]["value"], json!(i), "frame {i}");
    }
    let last: Value = serde_json::from_str(frames[10]).unwrap();
    assert_eq!(last["id"], json!(7));
    assert_eq!(last["result"]["content"][0]["text"], json!("done"));
}

#[tokio::test]
async fn stateless_mode_ignores_client_session_ids() {
    let server = streaming_server();
    add_plain_tool(&server).await;
    let (url, _server_task) = spawn_server(
        server,
        StreamableHttpServerConfig {
            stateless: true,
            ..Default::default()
        },
    )
    .await;
    let http = reqwest::Client::new();

    // No session is minted on initialize.
    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&init_frame())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("Mcp-Session-Id").is_none());

    // A stale id on tools/list is silently ignored rather than rejected.
    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", "left-over-from-somewhere")
        .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["tools"][0]["name"], json!("plain"));
}

#[tokio::test]
async fn stateless_mode_rejects_the_listening_stream() {
    let (url, _server_task) = spawn_server(
        streaming_server(),
        StreamableHttpServerConfig {
            stateless: true,
            ..Default::default()
        },
    )
    .await;
    let http = reqwest::Client::new();

    let response = http
        .get(&url)
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn sampling_response_with_unknown_id_is_a_server_error() {
    let (url, _server_task) =
        spawn_server(streaming_server(), StreamableHttpServerConfig::default()).await;
    let http = reqwest::Client::new();
    let session = initialize(&url, &http).await;

    // No session id at all on a response body.
    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&json!({"jsonrpc": "2.0", "id": 42, "result": {"role": "assistant"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Valid session, but nobody is waiting on id 42.
    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": {
                "role": "assistant",
                "content": {"type": "text", "text": "hi"},
                "model": "m"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn sampling_queue_overflow_reports_queue_full() {
    let server = streaming_server();
    let (url, _server_task) = spawn_server(
        server.clone(),
        StreamableHttpServerConfig {
            sampling_queue_size: 1,
            ..Default::default()
        },
    )
    .await;
    let http = reqwest::Client::new();
    let session = initialize(&url, &http).await;

    let params = CreateMessageParams {
        messages: vec![],
        max_tokens: 8,
        system_prompt: None,
        include_context: None,
        temperature: None,
        stop_sequences: None,
        model_preferences: None,
        metadata: None,
    };

    // First request parks in the queue; nobody is draining it.
    let first = {
        let server = server.clone();
        let session = session.clone();
        let params = params.clone();
        tokio::spawn(async move {
            server
                .request_sampling(Some(&session), params, Duration::from_millis(300))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = server
        .request_sampling(Some(&session), params, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("queue is full"), "{err}");

    let _ = first.await;
}

#[tokio::test]
async fn end_to_end_sampling_round_trip() {
    let server = Arc::new(McpServer::with_options(
        "sampling-server",
        "1.0",
        ServerOptions {
            sampling_enabled: true,
            ..Default::default()
        },
    ));
    let (url, _server_task) =
        spawn_server(server.clone(), StreamableHttpServerConfig::default()).await;

    let transport = StreamableHttpClientTransport::with_config(
        &url,
        ClientTransportConfig {
            reconnect_interval: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let mut client = McpClient::new(transport, "sampling-client", "1.0");
    client.set_sampling_handler(SamplingFn(|params: CreateMessageParams| async move {
        assert_eq!(params.max_tokens, 16);
        Ok(CreateMessageResult {
            role: Role::Assistant,
            content: Content::text("the answer"),
            model: "test-llm".to_string(),
            stop_reason: Some("endTurn".to_string()),
        })
    }));

    client.initialize().await.unwrap();
    client.transport().start_listening();
    let session_id = client.transport().session_id().expect("session id");

    let result = server
        .request_sampling(
            Some(&session_id),
            CreateMessageParams {
                messages: vec![SamplingMessage {
                    role: Role::User,
                    content: Content::text("question?"),
                }],
                max_tokens: 16,
                system_prompt: None,
                include_context: None,
                temperature: None,
                stop_sequences: None,
                model_preferences: None,
                metadata: None,
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(result.model, "test-llm");
    assert_eq!(result.content.as_text(), Some("the answer"));
    client.close().await.unwrap();
}
