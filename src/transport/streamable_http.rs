//! Streamable HTTP transport: one URL, three request shapes.
//!
//! POSTed requests are answered either with a plain JSON body or, when the
//! handler emits notifications mid-call, with an SSE stream carrying those
//! notifications followed by the final response. POSTed notifications and
//! responses get 202. GET opens the server-push stream for broadcast
//! notifications and reverse sampling requests.
//!
//! Session ids ride the `Mcp-Session-Id` header: minted on `initialize` in
//! stateful mode, ignored entirely in stateless mode.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any as CorsAny, CorsLayer};

use crate::auth::TokenSource;
use crate::core::error::{McpError, McpResult};
use crate::protocol::codec;
use crate::protocol::types::{
    error_codes, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
    HEADER_PROTOCOL_VERSION, HEADER_SESSION_ID,
};
use crate::server::engine::McpServer;
use crate::server::session::{
    ClientSession, SamplingBridge, SessionLogLevel, SessionTools,
};
use crate::transport::sse::{lowercase_headers, SseParser};
use crate::transport::{ClientTransportConfig, Transport};

// ============================================================================
// Server half
// ============================================================================

/// Server-side knobs.
#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    /// The single endpoint path.
    pub endpoint_path: String,
    /// Stateless mode: no session ids are minted and client-supplied ids
    /// are ignored on every method.
    pub stateless: bool,
    /// Per-session push queue depth (GET stream lane).
    pub queue_size: usize,
    /// Per-session reverse sampling queue depth.
    pub sampling_queue_size: usize,
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/mcp".to_string(),
            stateless: false,
            queue_size: 100,
            sampling_queue_size: 8,
        }
    }
}

/// Session backing one `Mcp-Session-Id`.
struct StreamableSession {
    id: String,
    initialized: AtomicBool,
    push: mpsc::Sender<JsonRpcMessage>,
    push_rx: Arc<Mutex<mpsc::Receiver<JsonRpcMessage>>>,
    sampling: SamplingBridge,
    sampling_rx: Arc<Mutex<mpsc::Receiver<JsonRpcRequest>>>,
    tools: SessionTools,
    log_level: SessionLogLevel,
}

impl StreamableSession {
    fn create(id: String, config: &StreamableHttpServerConfig) -> Arc<Self> {
        let (push, push_rx) = mpsc::channel(config.queue_size);
        let (sampling, sampling_rx) = SamplingBridge::new(config.sampling_queue_size);
        Arc::new(Self {
            id,
            initialized: AtomicBool::new(false),
            push,
            push_rx: Arc::new(Mutex::new(push_rx)),
            sampling,
            sampling_rx: Arc::new(Mutex::new(sampling_rx)),
            tools: SessionTools::new(),
            log_level: SessionLogLevel::new(),
        })
    }
}

impl ClientSession for StreamableSession {
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
        self.push
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

/// Routes notifications emitted during one POSTed request into that
/// request's response stream; everything else falls through to the session.
struct RequestScopedSession {
    inner: Arc<StreamableSession>,
    request_notifications: mpsc::UnboundedSender<JsonRpcNotification>,
}

impl ClientSession for RequestScopedSession {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn mark_initialized(&self) {
        self.inner.mark_initialized()
    }

    fn enqueue(&self, message: JsonRpcMessage) -> McpResult<()> {
        match message {
            JsonRpcMessage::Notification(notification) => self
                .request_notifications
                .send(notification)
                .map_err(|_| McpError::transport("request stream closed")),
            other => self.inner.enqueue(other),
        }
    }

    fn sampling(&self) -> Option<&SamplingBridge> {
        self.inner.sampling()
    }

    fn tool_overrides(&self) -> Option<&SessionTools> {
        self.inner.tool_overrides()
    }

    fn log_level(&self) -> Option<&SessionLogLevel> {
        self.inner.log_level()
    }
}

/// The transport's own id -> concrete session map. The engine registry
/// holds the same sessions as trait objects for fan-out; this map gives the
/// POST and GET handlers their channels back.
type SessionMap = Arc<std::sync::RwLock<HashMap<String, Arc<StreamableSession>>>>;

#[derive(Clone)]
struct StreamableState {
    server: Arc<McpServer>,
    config: Arc<StreamableHttpServerConfig>,
    sessions: SessionMap,
}

/// The Streamable HTTP server transport.
pub struct StreamableHttpServerTransport {
    server: Arc<McpServer>,
    config: StreamableHttpServerConfig,
    sessions: SessionMap,
}

impl StreamableHttpServerTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self::with_config(server, StreamableHttpServerConfig::default())
    }

    pub fn with_config(server: Arc<McpServer>, config: StreamableHttpServerConfig) -> Self {
        Self {
            server,
            config,
            sessions: Arc::new(std::sync::RwLock::new(HashMap::new())),
        }
    }

    /// The axum router for the single endpoint; mountable into a larger app.
    pub fn router(&self) -> Router {
        let state = StreamableState {
            server: self.server.clone(),
            config: Arc::new(self.config.clone()),
            sessions: self.sessions.clone(),
        };
        Router::new()
            .route(&self.config.endpoint_path, any(handle_endpoint))
            .layer(CorsLayer::new().allow_origin(CorsAny).allow_headers(CorsAny))
            .with_state(state)
    }

    /// Bind and serve until the process exits.
    pub async fn serve(self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| McpError::transport(format!("bind {addr}: {e}")))?;
        tracing::info!(%addr, "streamable HTTP transport listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| McpError::transport(e.to_string()))
    }
}

async fn handle_endpoint(
    State(state): State<StreamableState>,
    method: axum::http::Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    if method == axum::http::Method::POST {
        handle_post(state, headers, body).await
    } else if method == axum::http::Method::GET {
        handle_get(state, headers).await
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

async fn handle_post(state: StreamableState, headers: HeaderMap, body: String) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return (
            StatusCode::BAD_REQUEST,
            format!("Invalid content type: {content_type}"),
        )
            .into_response();
    }

    if serde_json::from_str::<serde_json::Value>(&body).is_err() {
        let error = JsonRpcError::new(
            None,
            error_codes::PARSE_ERROR,
            "request body is not valid json",
        );
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::to_vec(&error).unwrap_or_default(),
            None,
        );
    }

    let message = match codec::decode(body.as_bytes()) {
        Ok(message) => message,
        Err(err) => {
            let error = JsonRpcError::new(None, error_codes::INVALID_REQUEST, err.to_string());
            return json_response(
                StatusCode::BAD_REQUEST,
                serde_json::to_vec(&error).unwrap_or_default(),
                None,
            );
        }
    };

    let client_session_id = headers
        .get(HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_initialize = matches!(
        &message,
        JsonRpcMessage::Request(r) if r.method == crate::protocol::methods::INITIALIZE
    );

    // Session resolution. Stateless mode ignores any client-supplied id on
    // every method, including initialize.
    let (session, minted_id): (Arc<StreamableSession>, Option<String>) = if state.config.stateless
    {
        let session = StreamableSession::create(
            format!("stateless-{}", uuid::Uuid::new_v4()),
            &state.config,
        );
        // Stateless sessions exist for one request; the ready gate would
        // reject everything, so they are born initialized.
        session.mark_initialized();
        (session, None)
    } else if is_initialize {
        let id = uuid::Uuid::new_v4().to_string();
        let session = StreamableSession::create(id.clone(), &state.config);
        state
            .sessions
            .write()
            .expect("session map lock")
            .insert(id.clone(), session.clone());
        state.server.register_session(session.clone());
        (session, Some(id))
    } else {
        let Some(id) = client_session_id else {
            return (StatusCode::BAD_REQUEST, "Missing session ID").into_response();
        };
        let found = state
            .sessions
            .read()
            .expect("session map lock")
            .get(&id)
            .cloned();
        let Some(session) = found else {
            return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
        };
        (session, None)
    };

    let header_map = lowercase_headers(&headers);
    let dyn_session: Arc<dyn ClientSession> = session.clone();
    match message {
        JsonRpcMessage::Notification(_) => {
            state
                .server
                .dispatch(&dyn_session, message, header_map)
                .await;
            StatusCode::ACCEPTED.into_response()
        }
        JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
            match state.server.route_client_response(&dyn_session, &message) {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(err) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
                }
            }
        }
        JsonRpcMessage::Request(_) => {
            serve_request(state, session, message, header_map, minted_id).await
        }
    }
}

/// Serve one POSTed request, picking plain-JSON or streaming mode by
/// whether the handler emits notifications before returning.
async fn serve_request(
    state: StreamableState,
    session: Arc<StreamableSession>,
    message: JsonRpcMessage,
    header_map: HashMap<String, String>,
    minted_id: Option<String>,
) -> Response {
    let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
    let scoped: Arc<dyn ClientSession> = Arc::new(RequestScopedSession {
        inner: session,
        request_notifications: notification_tx,
    });

    let server = state.server.clone();
    let mut handler = tokio::spawn(async move {
        server.dispatch(&scoped, message, header_map).await
    });

    tokio::select! {
        first = notification_rx.recv() => {
            match first {
                Some(first) => {
                    stream_response(first, notification_rx, handler, minted_id)
                }
                // Channel closed without a notification: the handler is done.
                None => match handler.await {
                    Ok(reply) => plain_response(reply, minted_id),
                    Err(err) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
                    }
                },
            }
        }
        result = &mut handler => {
            match result {
                Ok(reply) => plain_response(reply, minted_id),
                Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
            }
        }
    }
}

fn plain_response(reply: Option<JsonRpcMessage>, minted_id: Option<String>) -> Response {
    match reply {
        Some(frame) => match codec::encode(&frame) {
            Ok(bytes) => json_response(StatusCode::OK, bytes, minted_id),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        },
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn stream_response(
    first: JsonRpcNotification,
    mut notification_rx: mpsc::UnboundedReceiver<JsonRpcNotification>,
    handler: tokio::task::JoinHandle<Option<JsonRpcMessage>>,
    minted_id: Option<String>,
) -> Response {
    let (event_tx, event_rx) = mpsc::channel::<Event>(16);

    tokio::spawn(async move {
        if send_message_event(&event_tx, &JsonRpcMessage::Notification(first))
            .await
            .is_err()
        {
            return;
        }

        // Mid-call notifications stream as they arrive; the channel closes
        // when the handler's session handle drops, which is when the final
        // response becomes available.
        while let Some(notification) = notification_rx.recv().await {
            if send_message_event(&event_tx, &JsonRpcMessage::Notification(notification))
                .await
                .is_err()
            {
                return;
            }
        }

        match handler.await {
            Ok(Some(reply)) => {
                let _ = send_message_event(&event_tx, &reply).await;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "request handler panicked"),
        }
        // event_tx drops here, ending the stream after the final response.
    });

    let stream = ReceiverStream::new(event_rx).map(Ok::<Event, Infallible>);
    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    if let Some(id) = minted_id {
        if let Ok(value) = id.parse() {
            response.headers_mut().insert(HEADER_SESSION_ID, value);
        }
    }
    response
}

async fn send_message_event(
    event_tx: &mpsc::Sender<Event>,
    frame: &JsonRpcMessage,
) -> Result<(), ()> {
    let data = match codec::encode(frame) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::warn!(%err, "dropping unencodable frame");
            return Ok(());
        }
    };
    event_tx
        .send(Event::default().event("message").data(data))
        .await
        .map_err(|_| ())
}

fn json_response(status: StatusCode, body: Vec<u8>, minted_id: Option<String>) -> Response {
    let mut response = (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();
    if let Some(id) = minted_id {
        if let Ok(value) = id.parse() {
            response.headers_mut().insert(HEADER_SESSION_ID, value);
        }
    }
    response
}

async fn handle_get(state: StreamableState, headers: HeaderMap) -> Response {
    // A stateless server has no session to push to.
    if state.config.stateless {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(session_id) = headers
        .get(HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (StatusCode::BAD_REQUEST, "Missing session ID").into_response();
    };
    let found = state
        .sessions
        .read()
        .expect("session map lock")
        .get(&session_id)
        .cloned();
    let Some(session) = found else {
        return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
    };

    let push_rx = session.push_rx.clone();
    let sampling_rx = session.sampling_rx.clone();

    let stream = futures::stream::unfold(
        (push_rx, sampling_rx),
        |(push_rx, sampling_rx)| async move {
            let frame = {
                let mut push = push_rx.lock().await;
                let mut sampling = sampling_rx.lock().await;
                tokio::select! {
                    frame = push.recv() => frame,
                    request = sampling.recv() => request.map(JsonRpcMessage::Request),
                }
            };
            let frame = frame?;
            let data = match codec::encode(&frame) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    tracing::warn!(%err, "dropping unencodable frame");
                    String::new()
                }
            };
            let event = Event::default().event("message").data(data);
            Some((Ok::<Event, Infallible>(event), (push_rx, sampling_rx)))
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

// ============================================================================
// Client half
// ============================================================================

/// Client for the Streamable HTTP transport.
pub struct StreamableHttpClientTransport {
    http: reqwest::Client,
    url: String,
    session_id: Arc<std::sync::RwLock<Option<String>>>,
    protocol_version: Arc<std::sync::RwLock<Option<String>>>,
    notification_tx: mpsc::UnboundedSender<JsonRpcNotification>,
    notifications: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcNotification>>,
    server_request_tx: mpsc::UnboundedSender<JsonRpcRequest>,
    server_requests: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcRequest>>,
    listener: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    token_source: Option<Arc<dyn TokenSource>>,
    config: ClientTransportConfig,
    connected: AtomicBool,
}

impl StreamableHttpClientTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, ClientTransportConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: ClientTransportConfig) -> Self {
        let (notification_tx, notifications) = mpsc::unbounded_channel();
        let (server_request_tx, server_requests) = mpsc::unbounded_channel();
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            session_id: Arc::new(std::sync::RwLock::new(None)),
            protocol_version: Arc::new(std::sync::RwLock::new(None)),
            notification_tx,
            notifications: std::sync::Mutex::new(notifications),
            server_request_tx,
            server_requests: std::sync::Mutex::new(server_requests),
            listener: std::sync::Mutex::new(None),
            token_source: None,
            config,
            connected: AtomicBool::new(true),
        }
    }

    /// Attach a token source; every request then carries its bearer token.
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// The session id the server minted, once `initialize` completed.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session id lock").clone()
    }

    async fn request_builder(&self, body: Vec<u8>) -> McpResult<reqwest::RequestBuilder> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(id) = self.session_id.read().expect("session id lock").as_deref() {
            builder = builder.header(HEADER_SESSION_ID, id);
        }
        if let Some(version) = self
            .protocol_version
            .read()
            .expect("protocol version lock")
            .as_deref()
        {
            builder = builder.header(HEADER_PROTOCOL_VERSION, version);
        }
        if let Some(source) = &self.token_source {
            let token = source.access_token().await?;
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(builder)
    }

    /// Keep a GET stream open at all times so broadcast notifications and
    /// reverse requests arrive while no request is in flight. Reconnects
    /// after `reconnect_interval`; a 405 means the server does not support
    /// listening and stops the loop for good.
    pub fn start_listening(&self) {
        let mut listener = self.listener.lock().expect("listener lock");
        if listener.is_some() {
            return;
        }
        let http = self.http.clone();
        let url = self.url.clone();
        let session_id = self.session_id.clone();
        let protocol_version = self.protocol_version.clone();
        let notification_tx = self.notification_tx.clone();
        let server_request_tx = self.server_request_tx.clone();
        let interval = self.config.reconnect_interval;

        *listener = Some(tokio::spawn(async move {
            loop {
                let mut request = http
                    .get(&url)
                    .header(header::ACCEPT, "text/event-stream");
                if let Some(id) = session_id.read().expect("session id lock").as_deref() {
                    request = request.header(HEADER_SESSION_ID, id);
                }
                if let Some(version) =
                    protocol_version.read().expect("protocol version lock").as_deref()
                {
                    request = request.header(HEADER_PROTOCOL_VERSION, version);
                }

                match request.send().await {
                    Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                        tracing::info!("server does not support listening");
                        return;
                    }
                    Ok(response) if response.status().is_success() => {
                        let mut parser = SseParser::new();
                        let mut stream = response.bytes_stream();
                        while let Some(chunk) = stream.next().await {
                            let Ok(chunk) = chunk else { break };
                            for event in parser.feed(&chunk) {
                                if event.name != "message" {
                                    continue;
                                }
                                match codec::decode_str(&event.data) {
                                    Ok(JsonRpcMessage::Notification(n)) => {
                                        let _ = notification_tx.send(n);
                                    }
                                    Ok(JsonRpcMessage::Request(r)) => {
                                        let _ = server_request_tx.send(r);
                                    }
                                    Ok(_) => {}
                                    Err(err) => {
                                        tracing::warn!(%err, "unparseable push frame");
                                    }
                                }
                            }
                        }
                        tracing::debug!("listening stream ended, reconnecting");
                    }
                    Ok(response) => {
                        tracing::warn!(status = %response.status(), "listening stream rejected");
                    }
                    Err(err) => {
                        tracing::debug!(%err, "listening stream connect failed");
                    }
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Read an SSE response body until the reply for `id` arrives,
    /// forwarding interleaved notifications and reverse requests.
    async fn consume_stream(
        &self,
        response: reqwest::Response,
        id: &RequestId,
    ) -> McpResult<JsonRpcMessage> {
        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                if event.name != "message" {
                    continue;
                }
                match codec::decode_str(&event.data) {
                    Ok(JsonRpcMessage::Notification(n)) => {
                        let _ = self.notification_tx.send(n);
                    }
                    Ok(JsonRpcMessage::Request(r)) => {
                        let _ = self.server_request_tx.send(r);
                    }
                    Ok(reply) => {
                        if reply.id() == Some(id) {
                            return Ok(reply);
                        }
                        tracing::warn!("response for unexpected id in stream");
                    }
                    Err(err) => {
                        tracing::warn!(%err, "unparseable stream frame");
                    }
                }
            }
        }
        Err(McpError::transport(
            "stream ended before the response arrived",
        ))
    }
}

#[async_trait]
impl Transport for StreamableHttpClientTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcMessage> {
        let id = request.id.clone();
        let is_initialize = request.method == crate::protocol::methods::INITIALIZE;
        let body = codec::encode(&JsonRpcMessage::Request(request))?;

        let send = self.request_builder(body).await?.send();
        let response = tokio::time::timeout(self.config.request_timeout, send)
            .await
            .map_err(|_| McpError::timeout("request timed out"))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http(format!(
                "request failed with status {status}: {body}"
            )));
        }

        if is_initialize {
            if let Some(session) = response
                .headers()
                .get(HEADER_SESSION_ID)
                .and_then(|v| v.to_str().ok())
            {
                *self.session_id.write().expect("session id lock") = Some(session.to_string());
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("text/event-stream") {
            let reply = tokio::time::timeout(
                self.config.request_timeout,
                self.consume_stream(response, &id),
            )
            .await
            .map_err(|_| McpError::timeout("streaming response timed out"))??;
            Ok(reply)
        } else {
            let bytes = response.bytes().await?;
            codec::decode(&bytes)
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let body = codec::encode(&JsonRpcMessage::Notification(notification))?;
        let response = self.request_builder(body).await?.send().await?;
        if !response.status().is_success() {
            return Err(McpError::Http(format!(
                "notification failed with status {}",
                response.status()
            )));
        }
        Ok(())
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
        let body = codec::encode(&response)?;
        let reply = self.request_builder(body).await?.send().await?;
        if !reply.status().is_success() {
            return Err(McpError::Http(format!(
                "response POST failed with status {}",
                reply.status()
            )));
        }
        Ok(())
    }

    fn set_protocol_version(&self, version: &str) {
        *self.protocol_version.write().expect("protocol version lock") =
            Some(version.to_string());
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::Release);
        if let Some(listener) = self.listener.lock().expect("listener lock").take() {
            listener.abort();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn connection_info(&self) -> String {
        format!(
            "streamable HTTP transport (url: {}, session: {:?})",
            self.url,
            self.session_id()
        )
    }
}

impl Drop for StreamableHttpClientTransport {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().expect("listener lock").take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = StreamableHttpServerConfig::default();
        assert_eq!(config.endpoint_path, "/mcp");
        assert!(!config.stateless);
        assert_eq!(config.queue_size, 100);
    }

}
