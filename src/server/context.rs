//! Per-request context handed to handlers.
//!
//! The context carries the session handle, the request's `_meta`, and any
//! transport-level metadata (HTTP headers on the HTTP transports). Handlers
//! use it to emit notifications mid-call and to issue reverse sampling
//! requests; on the Streamable HTTP transport the first notification is
//! what flips the response into streaming mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::{CreateMessageParams, CreateMessageResult, ProgressParams};
use crate::protocol::methods;
use crate::protocol::types::{JsonRpcMessage, JsonRpcNotification, Meta, ProgressToken};
use crate::server::engine::McpServer;
use crate::server::session::ClientSession;

/// Context for one dispatched request.
#[derive(Clone)]
pub struct RequestContext {
    pub(crate) server: Arc<McpServer>,
    pub(crate) session: Arc<dyn ClientSession>,
    /// The `_meta` envelope of the request, if any.
    pub meta: Option<Meta>,
    /// Transport-level request metadata, e.g. HTTP headers lowercased.
    pub headers: HashMap<String, String>,
}

/// Tool handlers receive the same context the other handlers do.
pub type ToolContext = RequestContext;

impl RequestContext {
    pub(crate) fn new(
        server: Arc<McpServer>,
        session: Arc<dyn ClientSession>,
        meta: Option<Meta>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            server,
            session,
            meta,
            headers,
        }
    }

    /// The engine this request is being served by.
    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    /// Id of the session the request arrived on.
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// The request's progress token, when the caller asked for progress.
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.meta.as_ref()?.progress_token.as_ref()
    }

    /// One transport header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Enqueue a notification to this request's client. Fails fast with a
    /// queue-overflow error when the session queue is full.
    pub fn send_notification(&self, method: &str, params: Option<serde_json::Value>) -> McpResult<()> {
        self.session
            .enqueue(JsonRpcMessage::Notification(JsonRpcNotification::new(
                method, params,
            )))
    }

    /// Emit `notifications/progress` keyed to this request's token. A call
    /// without a token is a no-op so handlers need not branch on it.
    pub fn report_progress(&self, progress: f64, total: Option<f64>) -> McpResult<()> {
        let Some(token) = self.progress_token() else {
            return Ok(());
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total,
            message: None,
        };
        self.send_notification(methods::PROGRESS, Some(serde_json::to_value(params)?))
    }

    /// Issue a reverse `sampling/createMessage` on this session and wait for
    /// the client's completion.
    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
        timeout: Duration,
    ) -> McpResult<CreateMessageResult> {
        let bridge = self.session.sampling().ok_or(McpError::NoActiveSession)?;
        bridge
            .request(serde_json::to_value(params)?, timeout)
            .await
    }
}
