//! Legacy SSE transport, exercised both with raw HTTP (wire shape) and
//! through the client runtime (round trips and notification ordering).

#![cfg(feature = "http")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use weave_mcp_rs::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_server(server: Arc<McpServer>) -> (String, tokio::task::JoinHandle<()>) {
    init_tracing();
    let transport = SseServerTransport::new(server);
    let router = transport.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

/// Reads the raw event stream line by line, without the crate's parser, so
/// the wire shape itself is what the test asserts.
struct RawStream {
    stream: std::pin::Pin<
        Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>,
    >,
    buffer: String,
}

impl RawStream {
    async fn open(url: &str) -> Self {
        let response = reqwest::Client::new()
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Next (event-name, data) pair; comment/keep-alive lines skipped.
    async fn next_event(&mut self) -> (String, String) {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut name = "message".to_string();
                let mut data = Vec::new();
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event: ") {
                        name = value.to_string();
                    } else if let Some(value) = line.strip_prefix("data: ") {
                        data.push(value.to_string());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                return (name, data.join("\n"));
            }
            let chunk = self
                .stream
                .next()
                .await
                .expect("stream ended")
                .expect("stream error");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

#[tokio::test]
async fn first_event_names_the_post_endpoint() {
    let server = Arc::new(McpServer::new("sse-test", "1.0"));
    let (base, _task) = spawn_server(server).await;

    let mut stream = RawStream::open(&format!("{base}/sse")).await;
    let (name, data) = stream.next_event().await;
    assert_eq!(name, "endpoint");
    assert!(data.starts_with("/message?sessionId="), "{data}");
}

#[tokio::test]
async fn post_returns_202_and_reply_rides_the_stream() {
    let server = Arc::new(McpServer::new("sse-test", "1.0"));
    let (base, _task) = spawn_server(server).await;

    let mut stream = RawStream::open(&format!("{base}/sse")).await;
    let (_, endpoint) = stream.next_event().await;
    let message_url = format!("{base}{endpoint}");

    let response = reqwest::Client::new()
        .post(&message_url)
        .header("Content-Type", "application/json")
        .json(&json!({"jsonrpc": "2.0", "id": 11, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(response.text().await.unwrap().is_empty());

    let (name, data) = stream.next_event().await;
    assert_eq!(name, "message");
    let frame: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(frame["id"], json!(11));
    assert_eq!(frame["result"], json!({}));
}

#[tokio::test]
async fn unknown_session_id_on_post_is_rejected() {
    let server = Arc::new(McpServer::new("sse-test", "1.0"));
    let (base, _task) = spawn_server(server).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/message?sessionId=bogus"))
        .header("Content-Type", "application/json")
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn client_round_trip_with_ordered_notifications() {
    let server = Arc::new(McpServer::new("sse-test", "1.0"));
    server
        .add_tool(
            ToolBuilder::new("chatty")
                .description("Emits three notifications, then answers")
                .build(),
            ToolFn(|_args: ToolArguments, ctx: ToolContext| async move {
                for i in 0..3 {
                    let _ = ctx.send_notification(
                        "notifications/progress",
                        Some(json!({"value": i})),
                    );
                }
                Ok(CallToolResult::text("chatty done"))
            }),
        )
        .await;
    let (base, _task) = spawn_server(server).await;

    let transport = SseClientTransport::connect(&format!("{base}/sse"))
        .await
        .unwrap();
    let client = McpClient::new(transport, "sse-client", "1.0");

    let observed: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    client.on_notification("notifications/progress", move |n| {
        let value = n.params.unwrap()["value"].as_i64().unwrap();
        sink.lock().unwrap().push(value);
    });

    let init = client.initialize().await.unwrap();
    assert_eq!(init.server_info.name, "sse-test");

    let result = client.call_tool("chatty", None).await.unwrap();
    assert_eq!(result.content[0].as_text(), Some("chatty done"));

    // Notifications were enqueued before the reply, so they must all be
    // observable shortly after the call returns, in emission order.
    for _ in 0..100 {
        if observed.lock().unwrap().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(*observed.lock().unwrap(), vec![0, 1, 2]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn tool_list_travels_the_legacy_transport() {
    let server = Arc::new(McpServer::new("sse-test", "1.0"));
    server
        .add_tool(
            ToolBuilder::new("alpha")
                .with_string("q", true, "query")
                .build(),
            ToolFn(|_args: ToolArguments, _ctx: ToolContext| async move {
                Ok(CallToolResult::text("a"))
            }),
        )
        .await;
    let (base, _task) = spawn_server(server).await;

    let transport = SseClientTransport::connect(&format!("{base}/sse"))
        .await
        .unwrap();
    let client = McpClient::new(transport, "sse-client", "1.0");
    client.initialize().await.unwrap();

    let tools = client.list_tools(None).await.unwrap();
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(tools.tools[0].name, "alpha");
    let schema = tools.tools[0].input_schema.as_ref().unwrap();
    assert!(schema.properties.as_ref().unwrap().contains_key("q"));

    client.close().await.unwrap();
}
