//! Legacy SSE transport: one server-to-client event stream plus an HTTP
//! POST endpoint for client-to-server frames.
//!
//! The first event on `GET /sse` is `endpoint`, carrying the POST URL with
//! the session token baked into the query string. Every later event is
//! `message` with one JSON-RPC frame. POSTed requests are answered on the
//! SSE stream, not in the POST body; the POST itself returns 202.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::TokenSource;
use crate::core::error::{McpError, McpResult};
use crate::protocol::codec;
use crate::protocol::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
};
use crate::server::engine::McpServer;
use crate::server::session::{
    ClientSession, SamplingBridge, SessionLogLevel, SessionTools,
};
use crate::transport::{ClientTransportConfig, Transport};

// ============================================================================
// SSE wire parsing (shared with the Streamable HTTP client)
// ============================================================================

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Per the SSE spec an event without an `event:` field is a `message`
/// event; real servers rely on that, so the default is applied here rather
/// than left to callers.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // LF
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        name: self
                            .event_name
                            .take()
                            .unwrap_or_else(|| "message".to_string()),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                } else {
                    self.event_name = None;
                }
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event_name = Some(value.trim_start_matches(' ').to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // id:, retry:, and comment lines are ignored.
        }

        events
    }
}

// ============================================================================
// Server half
// ============================================================================

/// Paths and bounds for the SSE server.
#[derive(Debug, Clone)]
pub struct SseServerConfig {
    /// Path serving the event stream.
    pub sse_path: String,
    /// Path accepting POSTed frames.
    pub message_path: String,
    /// Per-session outbound queue depth.
    pub queue_size: usize,
}

impl Default for SseServerConfig {
    fn default() -> Self {
        Self {
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            queue_size: 100,
        }
    }
}

struct SseSession {
    id: String,
    initialized: AtomicBool,
    outbound: mpsc::Sender<JsonRpcMessage>,
    sampling: SamplingBridge,
    tools: SessionTools,
    log_level: SessionLogLevel,
}

impl ClientSession for SseSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    fn enqueue(&self, message: JsonRpcMessage) -> McpResult<()> {
        self.outbound
            .try_send(message)
            .map_err(|_| McpError::QueueFull("notification queue is full".to_string()))
    }

    fn sampling(&self) -> Option<&SamplingBridge> {
        Some(&self.sampling)
    }

    fn tool_overrides(&self) -> Option<&SessionTools> {
        Some(&self.tools)
    }

    fn log_level(&self) -> Option<&SessionLogLevel> {
        Some(&self.log_level)
    }
}

#[derive(Clone)]
struct SseState {
    server: Arc<McpServer>,
    config: Arc<SseServerConfig>,
}

/// Unregisters the session when the event stream is dropped.
struct StreamGuard {
    server: Arc<McpServer>,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.server.unregister_session(&self.session_id);
    }
}

/// The SSE server transport.
pub struct SseServerTransport {
    server: Arc<McpServer>,
    config: SseServerConfig,
}

impl SseServerTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self::with_config(server, SseServerConfig::default())
    }

    pub fn with_config(server: Arc<McpServer>, config: SseServerConfig) -> Self {
        Self { server, config }
    }

    /// The axum router serving both endpoints; mountable into a larger app.
    pub fn router(&self) -> Router {
        let state = SseState {
            server: self.server.clone(),
            config: Arc::new(self.config.clone()),
        };
        Router::new()
            .route(&self.config.sse_path, get(handle_sse))
            .route(&self.config.message_path, post(handle_message_post))
            .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
            .with_state(state)
    }

    /// Bind and serve until the process exits.
    pub async fn serve(self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| McpError::transport(format!("bind {addr}: {e}")))?;
        tracing::info!(%addr, "SSE transport listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| McpError::transport(e.to_string()))
    }
}

async fn handle_sse(State(state): State<SseState>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.config.queue_size);
    let (sampling, mut sampling_rx) = SamplingBridge::new(state.config.queue_size);

    let session = Arc::new(SseSession {
        id: session_id.clone(),
        initialized: AtomicBool::new(false),
        outbound: outbound_tx,
        sampling,
        tools: SessionTools::new(),
        log_level: SessionLogLevel::new(),
    });
    state.server.register_session(session);

    // Merge notifications/replies and reverse requests into one lane.
    let (event_tx, event_rx) = mpsc::channel::<Event>(state.config.queue_size);
    let endpoint = format!(
        "{}?sessionId={}",
        state.config.message_path, session_id
    );
    let _ = event_tx
        .send(Event::default().event("endpoint").data(endpoint))
        .await;

    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = outbound_rx.recv() => frame,
                request = sampling_rx.recv() => request.map(JsonRpcMessage::Request),
            };
            let Some(frame) = frame else { break };
            let data = match codec::encode(&frame) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    tracing::warn!(%err, "dropping unencodable frame");
                    continue;
                }
            };
            if event_tx
                .send(Event::default().event("message").data(data))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let guard = Arc::new(StreamGuard {
        server: state.server.clone(),
        session_id,
    });
    let stream = ReceiverStream::new(event_rx).map(move |event| {
        let _guard = &guard;
        Ok::<Event, Infallible>(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_message_post(
    State(state): State<SseState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let Some(session_id) = params.get("sessionId") else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    let Some(session) = state.server.sessions().lookup(session_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
    };

    let message = match codec::decode(body.as_bytes()) {
        Ok(message) => message,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid message: {err}")).into_response();
        }
    };

    // Dispatch off the request path; the reply rides the SSE stream.
    let server = state.server.clone();
    let header_map = lowercase_headers(&headers);
    tokio::spawn(async move {
        if let Some(reply) = server.dispatch(&session, message, header_map).await {
            if let Err(err) = session.enqueue(reply) {
                tracing::warn!(session = %session.id(), %err, "dropping reply");
            }
        }
    });

    (StatusCode::ACCEPTED, "").into_response()
}

pub(crate) fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

// ============================================================================
// Client half
// ============================================================================

type PendingMap = Arc<std::sync::Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>>>;
type ConnectionLostCallback = Arc<dyn Fn(&McpError) + Send + Sync>;

/// Client for the legacy SSE transport.
pub struct SseClientTransport {
    http: reqwest::Client,
    message_url: Arc<tokio::sync::OnceCell<String>>,
    pending: PendingMap,
    notifications: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcNotification>>,
    server_requests: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcRequest>>,
    connection_lost: Arc<std::sync::RwLock<Option<ConnectionLostCallback>>>,
    token_source: Option<Arc<dyn TokenSource>>,
    config: ClientTransportConfig,
    connected: Arc<AtomicBool>,
}

impl SseClientTransport {
    /// Open the event stream and wait for the `endpoint` event.
    pub async fn connect(sse_url: &str) -> McpResult<Self> {
        Self::connect_with_config(sse_url, ClientTransportConfig::default()).await
    }

    pub async fn connect_with_config(
        sse_url: &str,
        config: ClientTransportConfig,
    ) -> McpResult<Self> {
        let http = reqwest::Client::new();
        let base = url::Url::parse(sse_url)?;

        let message_url = Arc::new(tokio::sync::OnceCell::<String>::new());
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (notification_tx, notifications) = mpsc::unbounded_channel();
        let (server_request_tx, server_requests) = mpsc::unbounded_channel();
        let connection_lost: Arc<std::sync::RwLock<Option<ConnectionLostCallback>>> =
            Arc::new(std::sync::RwLock::new(None));
        let connected = Arc::new(AtomicBool::new(true));

        let response = http
            .get(sse_url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(McpError::Http(format!(
                "SSE connect failed with status {}",
                response.status()
            )));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
        {
            let message_url = message_url.clone();
            let pending = pending.clone();
            let connection_lost = connection_lost.clone();
            let connected = connected.clone();
            tokio::spawn(async move {
                let mut endpoint_tx = Some(endpoint_tx);
                let mut parser = SseParser::new();
                let mut stream = response.bytes_stream();
                let mut stream_error: Option<McpError> = None;

                while let Some(chunk) = stream.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            stream_error = Some(McpError::from(err));
                            break;
                        }
                    };
                    for event in parser.feed(&chunk) {
                        match event.name.as_str() {
                            "endpoint" => {
                                let resolved = base
                                    .join(&event.data)
                                    .map(|u| u.to_string())
                                    .unwrap_or(event.data.clone());
                                let _ = message_url.set(resolved.clone());
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(resolved);
                                }
                            }
                            "message" => match codec::decode_str(&event.data) {
                                Ok(JsonRpcMessage::Notification(n)) => {
                                    let _ = notification_tx.send(n);
                                }
                                Ok(JsonRpcMessage::Request(r)) => {
                                    let _ = server_request_tx.send(r);
                                }
                                Ok(reply) => {
                                    route_reply(&pending, reply);
                                }
                                Err(err) => {
                                    tracing::warn!(%err, "unparseable SSE frame");
                                }
                            },
                            other => {
                                tracing::trace!(event = %other, "ignoring SSE event");
                            }
                        }
                    }
                }

                connected.store(false, Ordering::Release);

                // HTTP/2 graceful teardown is reported specially, and only
                // when a connection-lost callback is registered; otherwise
                // every stream end is an ordinary error.
                let error = stream_error
                    .unwrap_or_else(|| McpError::transport("SSE stream closed"));
                let callback = connection_lost.read().expect("callback lock").clone();
                match callback {
                    Some(callback) if error.to_string().contains("NO_ERROR") => {
                        callback(&error);
                    }
                    _ => {
                        tracing::warn!(%error, "SSE stream ended");
                    }
                }
            });
        }

        // The endpoint event is the handshake; no requests can flow before it.
        tokio::time::timeout(config.request_timeout, endpoint_rx)
            .await
            .map_err(|_| McpError::timeout("waiting for endpoint event"))?
            .map_err(|_| McpError::transport("SSE stream closed before endpoint event"))?;

        Ok(Self {
            http,
            message_url,
            pending,
            notifications: std::sync::Mutex::new(notifications),
            server_requests: std::sync::Mutex::new(server_requests),
            connection_lost,
            token_source: None,
            config,
            connected,
        })
    }

    /// Attach a token source; every POST then carries its bearer token.
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Register a callback fired when the stream ends with a graceful
    /// HTTP/2 teardown signal ("NO_ERROR"). Reconnection stays with the
    /// caller.
    pub fn set_connection_lost_callback(
        &self,
        callback: impl Fn(&McpError) + Send + Sync + 'static,
    ) {
        *self.connection_lost.write().expect("callback lock") = Some(Arc::new(callback));
    }

    async fn post_frame(&self, frame: &JsonRpcMessage) -> McpResult<()> {
        let url = self
            .message_url
            .get()
            .ok_or_else(|| McpError::transport("no message endpoint yet"))?;
        let mut request = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(codec::encode(frame)?);
        if let Some(source) = &self.token_source {
            let token = source.access_token().await?;
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(McpError::Http(format!(
                "message POST failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn route_reply(pending: &PendingMap, reply: JsonRpcMessage) {
    let id = reply.id().cloned();
    let waiter = id.and_then(|id| pending.lock().expect("pending lock").remove(&id));
    match waiter {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => tracing::warn!("reply for unknown request id"),
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcMessage> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .insert(id.clone(), tx);

        if let Err(err) = self.post_frame(&JsonRpcMessage::Request(request)).await {
            self.pending.lock().expect("pending lock").remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(McpError::transport("connection closed")),
            Err(_) => {
                self.pending.lock().expect("pending lock").remove(&id);
                Err(McpError::timeout("request timed out"))
            }
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
        self.post_frame(&JsonRpcMessage::Notification(notification))
            .await
    }

    async fn receive_notification(&self) -> McpResult<Option<JsonRpcNotification>> {
        let mut notifications = self.notifications.lock().expect("notifications lock");
        match notifications.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(McpError::transport("notification channel closed"))
            }
        }
    }

    async fn receive_server_request(&self) -> McpResult<Option<JsonRpcRequest>> {
        let mut requests = self.server_requests.lock().expect("server requests lock");
        match requests.try_recv() {
            Ok(request) => Ok(Some(request)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Ok(None),
        }
    }

    async fn send_response(&self, response: JsonRpcMessage) -> McpResult<()> {
        self.post_frame(&response).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn connection_info(&self) -> String {
        format!(
            "SSE transport (endpoint: {:?})",
            self.message_url.get()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_defaults_missing_event_name_to_message() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "message");
    }

    #[test]
    fn parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: endpoint\r\nda").is_empty());
        let events = parser.feed(b"ta: /message?sessionId=1\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                name: "endpoint".to_string(),
                data: "/message?sessionId=1".to_string(),
            }]
        );
    }

    #[test]
    fn parser_joins_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn parser_resets_between_events() {
        let mut parser = SseParser::new();
        let first = parser.feed(b"event: endpoint\ndata: /m\n\n");
        let second = parser.feed(b"data: {}\n\n");
        assert_eq!(first[0].name, "endpoint");
        assert_eq!(second[0].name, "message");
    }
}
