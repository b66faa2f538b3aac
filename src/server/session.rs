//! Session handles and the process-wide session registry.
//!
//! A session is the association between one connected client and the engine,
//! created by a transport at connection time and torn down on disconnect.
//! Optional features are capability accessors: a transport's session type
//! returns `Some` only for what it supports, and the engine checks before
//! using the feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::core::error::{McpError, McpResult};
use crate::core::tool::RegisteredTool;
use crate::protocol::messages::CreateMessageResult;
use crate::protocol::methods;
use crate::protocol::types::{JsonRpcMessage, JsonRpcRequest, LoggingLevel, RequestId};

/// One connected client as the engine sees it.
pub trait ClientSession: Send + Sync {
    /// Opaque id the transport minted for this connection.
    fn id(&self) -> &str;

    /// Whether `notifications/initialized` has been observed.
    fn is_initialized(&self) -> bool;

    /// Flip the session to ready. Called by the engine exactly once per
    /// session, on `notifications/initialized`.
    fn mark_initialized(&self);

    /// Enqueue an outbound frame without blocking. A full queue fails fast
    /// with a queue-overflow error; the engine never parks on a slow client.
    fn enqueue(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Sampling capability, when the transport supports reverse requests.
    fn sampling(&self) -> Option<&SamplingBridge> {
        None
    }

    /// Session-scoped tool overrides, when supported.
    fn tool_overrides(&self) -> Option<&SessionTools> {
        None
    }

    /// Per-session log-level slot, when supported.
    fn log_level(&self) -> Option<&SessionLogLevel> {
        None
    }

    /// Called once when the session is unregistered.
    fn on_close(&self) {}
}

// ============================================================================
// Capability building blocks
// ============================================================================

/// Per-session tool overrides that shadow the global registry.
#[derive(Default)]
pub struct SessionTools {
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl SessionTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tool: RegisteredTool) {
        let mut tools = self.tools.write().expect("session tools lock");
        tools.insert(tool.tool.name.clone(), tool);
    }

    pub fn delete(&self, names: &[&str]) {
        let mut tools = self.tools.write().expect("session tools lock");
        for name in names {
            tools.remove(*name);
        }
    }

    pub fn get(&self, name: &str) -> Option<RegisteredTool> {
        self.tools.read().expect("session tools lock").get(name).cloned()
    }

    /// Snapshot of the overrides merged over `base`, for `tools/list`.
    pub fn merged(&self, mut base: HashMap<String, RegisteredTool>) -> HashMap<String, RegisteredTool> {
        for (name, tool) in self.tools.read().expect("session tools lock").iter() {
            base.insert(name.clone(), tool.clone());
        }
        base
    }
}

/// Per-session minimum logging level; messages below it are dropped.
pub struct SessionLogLevel(RwLock<LoggingLevel>);

impl SessionLogLevel {
    pub fn new() -> Self {
        Self(RwLock::new(LoggingLevel::default()))
    }

    pub fn get(&self) -> LoggingLevel {
        *self.0.read().expect("log level lock")
    }

    pub fn set(&self, level: LoggingLevel) {
        *self.0.write().expect("log level lock") = level;
    }
}

impl Default for SessionLogLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverse-request plumbing shared by every sampling-capable session type.
///
/// Outbound requests go through a bounded queue the transport drains;
/// responses come back through [`SamplingBridge::resolve`] keyed by request
/// id. The pending table holds exactly one one-shot waiter per in-flight
/// request; entries leave on reply, timeout, or close.
pub struct SamplingBridge {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<McpResult<CreateMessageResult>>>>,
    queue: mpsc::Sender<JsonRpcRequest>,
    closed: AtomicBool,
}

impl SamplingBridge {
    /// Create a bridge with the given queue capacity, returning the receiver
    /// the transport drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JsonRpcRequest>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                queue,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Issue a `sampling/createMessage` and block until the client answers,
    /// the timeout lapses, or the session closes.
    pub async fn request(
        &self,
        params: serde_json::Value,
        timeout: Duration,
    ) -> McpResult<CreateMessageResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Cancelled("session closed".to_string()));
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::new(
            id.clone(),
            methods::SAMPLING_CREATE_MESSAGE,
            Some(params),
        );

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("sampling pending lock");
            pending.insert(id.clone(), tx);
        }

        if self.queue.try_send(request).is_err() {
            self.remove(&id);
            return Err(McpError::QueueFull("sampling queue is full".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Cancelled("session closed".to_string())),
            Err(_) => {
                self.remove(&id);
                Err(McpError::timeout("sampling request timed out"))
            }
        }
    }

    /// Route a client response to its waiter. Unknown ids are an error the
    /// transport reports (HTTP 500 on Streamable HTTP).
    pub fn resolve(&self, id: &RequestId, result: McpResult<CreateMessageResult>) -> McpResult<()> {
        match self.remove(id) {
            Some(tx) => {
                let _ = tx.send(result);
                Ok(())
            }
            None => Err(McpError::internal(format!(
                "no pending sampling request with id {id}"
            ))),
        }
    }

    /// Drop every waiter with a session-closed error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut pending = self.pending.lock().expect("sampling pending lock");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(McpError::Cancelled("session closed".to_string())));
        }
    }

    fn remove(&self, id: &RequestId) -> Option<oneshot::Sender<McpResult<CreateMessageResult>>> {
        self.pending.lock().expect("sampling pending lock").remove(id)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide map from session id to handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<dyn ClientSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<dyn ClientSession>) {
        let mut sessions = self.sessions.write().expect("session registry lock");
        sessions.insert(session.id().to_string(), session);
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn ClientSession>> {
        let removed = {
            let mut sessions = self.sessions.write().expect("session registry lock");
            sessions.remove(id)
        };
        if let Some(session) = &removed {
            if let Some(sampling) = session.sampling() {
                sampling.close();
            }
            session.on_close();
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<dyn ClientSession>> {
        self.sessions.read().expect("session registry lock").get(id).cloned()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<dyn ClientSession>)) {
        let sessions = self.sessions.read().expect("session registry lock");
        for session in sessions.values() {
            f(session);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeSession {
        id: String,
        initialized: AtomicBool,
        sampling: SamplingBridge,
    }

    impl ClientSession for FakeSession {
        fn id(&self) -> &str {
            &self.id
        }
        fn is_initialized(&self) -> bool {
            self.initialized.load(Ordering::Acquire)
        }
        fn mark_initialized(&self) {
            self.initialized.store(true, Ordering::Release);
        }
        fn enqueue(&self, _message: JsonRpcMessage) -> McpResult<()> {
            Ok(())
        }
        fn sampling(&self) -> Option<&SamplingBridge> {
            Some(&self.sampling)
        }
    }

    #[tokio::test]
    async fn sampling_queue_overflow_fails_fast() {
        let (bridge, _rx) = SamplingBridge::new(1);
        let fill = bridge.queue.try_send(JsonRpcRequest::new(
            0,
            methods::SAMPLING_CREATE_MESSAGE,
            None,
        ));
        assert!(fill.is_ok());
        let err = bridge
            .request(json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("queue is full"));
    }

    #[tokio::test]
    async fn resolve_wakes_the_waiter() {
        let (bridge, mut rx) = SamplingBridge::new(4);
        let bridge = Arc::new(bridge);

        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .request(json!({"maxTokens": 10}), Duration::from_secs(1))
                    .await
            })
        };

        let outbound = rx.recv().await.expect("queued request");
        let result = CreateMessageResult {
            role: crate::protocol::types::Role::Assistant,
            content: crate::protocol::types::Content::text("hi"),
            model: "test-model".to_string(),
            stop_reason: None,
        };
        bridge.resolve(&outbound.id, Ok(result.clone())).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), result);
    }

    #[tokio::test]
    async fn close_drops_waiters_with_cancellation() {
        let (bridge, _rx) = SamplingBridge::new(4);
        let bridge = Arc::new(bridge);

        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(
                async move { bridge.request(json!({}), Duration::from_secs(5)).await },
            )
        };
        tokio::task::yield_now().await;
        bridge.close();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Cancelled(_)));
    }

    #[test]
    fn registry_round_trip() {
        let registry = SessionRegistry::new();
        let (sampling, _rx) = SamplingBridge::new(1);
        let session: Arc<dyn ClientSession> = Arc::new(FakeSession {
            id: "s1".to_string(),
            initialized: AtomicBool::new(false),
            sampling,
        });

        registry.register(session.clone());
        assert!(registry.lookup("s1").is_some());
        assert_eq!(registry.len(), 1);

        registry.unregister("s1");
        assert!(registry.lookup("s1").is_none());
        assert!(registry.is_empty());
    }
}
