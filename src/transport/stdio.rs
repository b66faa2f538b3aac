//! StdIO transport: line-delimited JSON-RPC over standard streams.
//!
//! Server half: one reader task feeds a bounded queue, a clamped worker pool
//! drains it so slow tools never serialize the whole connection, and every
//! write to stdout goes through one mutex. Standard error stays free for the
//! log stream. Client half: spawns the server as a child process and speaks
//! the same framing over its pipes.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

use async_trait::async_trait;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
};
use crate::protocol::codec;
use crate::server::engine::McpServer;
use crate::server::session::{
    ClientSession, SamplingBridge, SessionLogLevel, SessionTools,
};
use crate::transport::{ClientTransportConfig, Transport};

/// Pool and queue bounds for the server half.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// Concurrent dispatch workers. Clamped to `[1, 100]`.
    pub worker_count: usize,
    /// Dispatch and notification queue depth. Clamped to `[1, 10000]`.
    pub queue_size: usize,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_size: 100,
        }
    }
}

impl StdioConfig {
    /// Zero means "unset" and falls back to the default; everything else
    /// is clamped to the valid range.
    fn clamped(mut self) -> Self {
        let defaults = Self::default();
        if self.worker_count == 0 {
            self.worker_count = defaults.worker_count;
        }
        if self.queue_size == 0 {
            self.queue_size = defaults.queue_size;
        }
        self.worker_count = self.worker_count.clamp(1, 100);
        self.queue_size = self.queue_size.clamp(1, 10_000);
        self
    }
}

// ============================================================================
// Server half
// ============================================================================

struct StdioSession {
    id: String,
    initialized: std::sync::atomic::AtomicBool,
    outbound: mpsc::Sender<JsonRpcMessage>,
    sampling: SamplingBridge,
    tools: SessionTools,
    log_level: SessionLogLevel,
}

impl ClientSession for StdioSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(std::sync::atomic::Ordering::Acquire)
    }

    fn mark_initialized(&self) {
        self.initialized
            .store(true, std::sync::atomic::Ordering::Release);
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

/// The server half. One transport serves one peer for the life of the
/// process's stdin.
pub struct StdioServerTransport {
    server: Arc<McpServer>,
    config: StdioConfig,
}

impl StdioServerTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self::with_config(server, StdioConfig::default())
    }

    pub fn with_config(server: Arc<McpServer>, config: StdioConfig) -> Self {
        Self {
            server,
            config: config.clamped(),
        }
    }

    /// Serve on the process's standard streams until stdin reaches EOF.
    pub async fn serve(self) -> McpResult<()> {
        self.serve_streams(tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Serve on the standard streams until stdin reaches EOF or `shutdown`
    /// resolves, whichever comes first.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send,
    ) -> McpResult<()> {
        self.serve_streams_with_shutdown(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }

    /// Serve on arbitrary streams until the reader reaches EOF.
    pub async fn serve_streams<R, W>(self, reader: R, writer: W) -> McpResult<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_streams_with_shutdown(reader, writer, std::future::pending())
            .await
    }

    /// Serve on arbitrary streams. Intake stops at reader EOF or on the
    /// shutdown signal; in-flight handlers are allowed to finish either way.
    pub async fn serve_streams_with_shutdown<R, W>(
        self,
        reader: R,
        writer: W,
        shutdown: impl std::future::Future<Output = ()> + Send,
    ) -> McpResult<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let session_id = format!("stdio-{}", uuid::Uuid::new_v4());
        let (outbound_tx, mut outbound_rx) = mpsc::channel(self.config.queue_size);
        let (sampling, mut sampling_rx) = SamplingBridge::new(self.config.queue_size);

        let session = Arc::new(StdioSession {
            id: session_id.clone(),
            initialized: std::sync::atomic::AtomicBool::new(false),
            outbound: outbound_tx,
            sampling,
            tools: SessionTools::new(),
            log_level: SessionLogLevel::new(),
        });
        let dyn_session: Arc<dyn ClientSession> = session.clone();
        self.server.register_session(dyn_session.clone());

        let writer = Arc::new(Mutex::new(BufWriter::new(writer)));

        // Outbound pumps: session notifications keep their enqueue order;
        // sampling requests ride a separate lane.
        let notification_pump = {
            let writer = writer.clone();
            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if let Err(err) = write_frame(&writer, &frame).await {
                        tracing::warn!(%err, "stdio notification write failed");
                        break;
                    }
                }
            })
        };
        let sampling_pump = {
            let writer = writer.clone();
            tokio::spawn(async move {
                while let Some(request) = sampling_rx.recv().await {
                    let frame = JsonRpcMessage::Request(request);
                    if let Err(err) = write_frame(&writer, &frame).await {
                        tracing::warn!(%err, "stdio sampling write failed");
                        break;
                    }
                }
            })
        };

        // Worker pool over the bounded dispatch queue.
        let (queue_tx, queue_rx) = mpsc::channel::<String>(self.config.queue_size);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let mut workers = Vec::with_capacity(self.config.worker_count);
        for _ in 0..self.config.worker_count {
            let queue_rx = queue_rx.clone();
            let server = self.server.clone();
            let session = dyn_session.clone();
            let writer = writer.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let line = {
                        let mut rx = queue_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(line) = line else { break };
                    eprintln!("DEBUG worker got line: {line}");
                    if let Some(reply) = server
                        .handle_message(&session, line.as_bytes(), HashMap::new())
                        .await
                    {
                        eprintln!("DEBUG worker writing reply");
                        if let Err(err) = write_frame(&writer, &reply).await {
                            tracing::warn!(%err, "stdio reply write failed");
                        }
                        eprintln!("DEBUG worker wrote reply");
                    }
                }
            }));
        }

        // Reader: one line per frame, CR tolerated before LF.
        let mut lines = BufReader::new(reader).lines();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("stdio transport shutting down");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if queue_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("stdio reader reached EOF");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(%err, "stdio read failed");
                        break;
                    }
                }
            }
        }

        // Let in-flight handlers finish, then tear the session down.
        drop(queue_tx);
        for worker in workers {
            let _ = worker.await;
        }
        self.server.unregister_session(&session_id);
        drop(dyn_session);
        drop(session);
        let _ = notification_pump.await;
        let _ = sampling_pump.await;
        Ok(())
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &Arc<Mutex<BufWriter<W>>>,
    frame: &JsonRpcMessage,
) -> McpResult<()> {
    let bytes = codec::encode(frame)?;
    let mut writer = writer.lock().await;
    writer.write_all(&bytes).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Client half
// ============================================================================

/// Client transport that runs the server as a child process.
pub struct StdioClientTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<BufWriter<tokio::process::ChildStdin>>>,
    pending: Arc<std::sync::Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>>>,
    notifications: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcNotification>>,
    server_requests: std::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcRequest>>,
    config: ClientTransportConfig,
    connected: std::sync::atomic::AtomicBool,
}

impl StdioClientTransport {
    /// Spawn `command args...` and attach to its pipes.
    pub async fn spawn(command: &str, args: &[&str]) -> McpResult<Self> {
        Self::spawn_with_config(command, args, ClientTransportConfig::default()).await
    }

    pub async fn spawn_with_config(
        command: &str,
        args: &[&str],
        config: ClientTransportConfig,
    ) -> McpResult<Self> {
        tracing::debug!(%command, ?args, "starting MCP server process");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| McpError::transport(format!("failed to start server process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("no stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("no stdout handle"))?;

        let pending: Arc<std::sync::Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>>> =
            Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (notification_tx, notifications) = mpsc::unbounded_channel();
        let (server_request_tx, server_requests) = mpsc::unbounded_channel();

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match codec::decode_str(&line) {
                    Ok(JsonRpcMessage::Notification(n)) => {
                        if notification_tx.send(n).is_err() {
                            break;
                        }
                    }
                    Ok(JsonRpcMessage::Request(r)) => {
                        if server_request_tx.send(r).is_err() {
                            break;
                        }
                    }
                    Ok(reply) => {
                        let id = reply.id().cloned();
                        let waiter = id.and_then(|id| {
                            reader_pending.lock().expect("pending lock").remove(&id)
                        });
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => {
                                tracing::warn!("reply for unknown request id");
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, %line, "unparseable frame from server");
                    }
                }
            }
            tracing::debug!("stdio client reader finished");
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            pending,
            notifications: std::sync::Mutex::new(notifications),
            server_requests: std::sync::Mutex::new(server_requests),
            config,
            connected: std::sync::atomic::AtomicBool::new(true),
        })
    }

    async fn write_line(&self, frame: &JsonRpcMessage) -> McpResult<()> {
        let bytes = codec::encode(frame)?;
        let mut stdin = self.stdin.lock().await;
        let writer = stdin
            .as_mut()
            .ok_or_else(|| McpError::transport("transport not connected"))?;
        writer.write_all(&bytes).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcMessage> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .insert(id.clone(), tx);

        if let Err(err) = self.write_line(&JsonRpcMessage::Request(request)).await {
            self.pending.lock().expect("pending lock").remove(&id);
            return Err(err);
        }

        match timeout(self.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(McpError::transport("connection closed")),
            Err(_) => {
                self.pending.lock().expect("pending lock").remove(&id);
                Err(McpError::timeout("request timed out"))
            }
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
        self.write_line(&JsonRpcMessage::Notification(notification))
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
        self.write_line(&response).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected
            .store(false, std::sync::atomic::Ordering::Release);
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match timeout(std::time::Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(%status, "server process exited");
                }
                Ok(Err(err)) => {
                    tracing::warn!(%err, "waiting for server process");
                }
                Err(_) => {
                    tracing::warn!("server process did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Acquire)
    }

    fn connection_info(&self) -> String {
        format!("stdio transport (connected: {})", self.is_connected())
    }
}

impl Drop for StdioClientTransport {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.try_lock() {
            if let Some(child) = child.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}
