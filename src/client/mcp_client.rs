//! MCP client runtime.
//!
//! Mirrors the server engine from the caller's side: assigns request ids,
//! sends through a [`Transport`], and awaits the correlated reply. A
//! background service loop delivers server notifications to registered
//! handlers and answers reverse `sampling/createMessage` requests with the
//! configured sampling handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::*;
use crate::protocol::methods;
use crate::protocol::types::*;
use crate::transport::Transport;

/// Services reverse requests: the client-side LLM integration.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, params: CreateMessageParams) -> McpResult<CreateMessageResult>;
}

/// Closure adapter for sampling handlers.
pub struct SamplingFn<F>(pub F);

#[async_trait]
impl<F, Fut> SamplingHandler for SamplingFn<F>
where
    F: Fn(CreateMessageParams) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<CreateMessageResult>> + Send,
{
    async fn create_message(&self, params: CreateMessageParams) -> McpResult<CreateMessageResult> {
        (self.0)(params).await
    }
}

type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// The MCP client.
pub struct McpClient<T: Transport + 'static> {
    transport: Arc<T>,
    info: Implementation,
    next_id: AtomicI64,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
    notification_handlers: Arc<std::sync::RwLock<HashMap<String, Vec<NotificationHandler>>>>,
    initialized: Arc<AtomicBool>,
    negotiated_version: std::sync::RwLock<Option<String>>,
    server_capabilities: std::sync::RwLock<Option<ServerCapabilities>>,
    service_loop: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    poll_interval: Duration,
}

impl<T: Transport + 'static> McpClient<T> {
    pub fn new(transport: T, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(transport),
            info: Implementation::new(name, version),
            next_id: AtomicI64::new(1),
            sampling_handler: None,
            notification_handlers: Arc::new(std::sync::RwLock::new(HashMap::new())),
            initialized: Arc::new(AtomicBool::new(false)),
            negotiated_version: std::sync::RwLock::new(None),
            server_capabilities: std::sync::RwLock::new(None),
            service_loop: std::sync::Mutex::new(None),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Install the sampling handler. Doing so is what makes `initialize`
    /// advertise the `sampling` capability. Call before [`Self::initialize`].
    pub fn set_sampling_handler<H: SamplingHandler + 'static>(&mut self, handler: H) {
        self.sampling_handler = Some(Arc::new(handler));
    }

    /// Register a handler for one notification method.
    pub fn on_notification(
        &self,
        method: &str,
        handler: impl Fn(JsonRpcNotification) + Send + Sync + 'static,
    ) {
        let mut handlers = self
            .notification_handlers
            .write()
            .expect("notification handlers lock");
        handlers
            .entry(method.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// The protocol version agreed during `initialize`.
    pub fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version
            .read()
            .expect("version lock")
            .clone()
    }

    /// The capabilities the server advertised.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities
            .read()
            .expect("capabilities lock")
            .clone()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<R> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        match self.transport.send_request(request).await? {
            JsonRpcMessage::Response(response) => {
                serde_json::from_value(response.result).map_err(McpError::from)
            }
            JsonRpcMessage::Error(error) => Err(McpError::Rpc {
                code: error.error.code,
                message: error.error.message,
            }),
            other => Err(McpError::InvalidRequest(format!(
                "unexpected reply frame: {other:?}"
            ))),
        }
    }

    fn ensure_initialized(&self) -> McpResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(McpError::InvalidRequest(
                "client is not initialized".to_string(),
            ))
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run the initialization handshake.
    ///
    /// Advertises `sampling` iff a sampling handler was registered, checks
    /// the server's chosen version against the supported set (anything else
    /// is [`McpError::UnsupportedProtocolVersion`]), tells the transport the
    /// negotiated version, sends `notifications/initialized`, and starts the
    /// background service loop.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        let capabilities = ClientCapabilities {
            sampling: self
                .sampling_handler
                .as_ref()
                .map(|_| SamplingCapability::default()),
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
            experimental: None,
        };
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info: self.info.clone(),
            meta: None,
        };

        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion(
                result.protocol_version.clone(),
            ));
        }

        self.transport.set_protocol_version(&result.protocol_version);
        *self.negotiated_version.write().expect("version lock") =
            Some(result.protocol_version.clone());
        *self.server_capabilities.write().expect("capabilities lock") =
            Some(result.capabilities.clone());

        self.transport
            .send_notification(JsonRpcNotification::new(methods::INITIALIZED, None))
            .await?;
        self.initialized.store(true, Ordering::Release);

        self.start_service_loop();
        tracing::debug!(
            server = %result.server_info.name,
            version = %result.protocol_version,
            "initialized"
        );
        Ok(result)
    }

    /// Tear down the transport and stop the service loop.
    pub async fn close(&self) -> McpResult<()> {
        if let Some(task) = self.service_loop.lock().expect("service loop lock").take() {
            task.abort();
        }
        self.initialized.store(false, Ordering::Release);
        self.transport.close().await
    }

    fn start_service_loop(&self) {
        let mut slot = self.service_loop.lock().expect("service loop lock");
        if slot.is_some() {
            return;
        }

        let transport = self.transport.clone();
        let handlers = self.notification_handlers.clone();
        let sampling = self.sampling_handler.clone();
        let initialized = self.initialized.clone();
        let interval = self.poll_interval;

        *slot = Some(tokio::spawn(async move {
            loop {
                if !initialized.load(Ordering::Acquire) {
                    break;
                }

                let mut worked = false;

                match transport.receive_server_request().await {
                    Ok(Some(request)) => {
                        worked = true;
                        let reply = answer_server_request(sampling.as_ref(), request).await;
                        if let Err(err) = transport.send_response(reply).await {
                            tracing::warn!(%err, "failed to answer server request");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(%err, "server request channel closed");
                        break;
                    }
                }

                match transport.receive_notification().await {
                    Ok(Some(notification)) => {
                        worked = true;
                        let registered = {
                            let handlers = handlers.read().expect("notification handlers lock");
                            handlers.get(&notification.method).cloned()
                        };
                        if let Some(registered) = registered {
                            for handler in registered {
                                handler(notification.clone());
                            }
                        } else {
                            tracing::trace!(method = %notification.method, "unhandled notification");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(%err, "notification channel closed");
                        break;
                    }
                }

                if !worked {
                    tokio::time::sleep(interval).await;
                }
            }
        }));
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    pub async fn ping(&self) -> McpResult<()> {
        let _: EmptyResult = self.request(methods::PING, None).await?;
        Ok(())
    }

    pub async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        self.ensure_initialized()?;
        let params = PaginatedParams { cursor, meta: None };
        self.request(methods::TOOLS_LIST, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> McpResult<CallToolResult> {
        self.ensure_initialized()?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
            meta: None,
        };
        self.request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await
    }

    /// `tools/call` with a `_meta.progressToken` so the server can stream
    /// `notifications/progress` for this call.
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Option<Value>,
        progress_token: ProgressToken,
    ) -> McpResult<CallToolResult> {
        self.ensure_initialized()?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
            meta: Some(Meta::with_progress_token(progress_token)),
        };
        self.request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn list_resources(&self, cursor: Option<String>) -> McpResult<ListResourcesResult> {
        self.ensure_initialized()?;
        let params = PaginatedParams { cursor, meta: None };
        self.request(methods::RESOURCES_LIST, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> McpResult<ListResourceTemplatesResult> {
        self.ensure_initialized()?;
        let params = PaginatedParams { cursor, meta: None };
        self.request(
            methods::RESOURCES_TEMPLATES_LIST,
            Some(serde_json::to_value(&params)?),
        )
        .await
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.ensure_initialized()?;
        let params = ReadResourceParams {
            uri: uri.to_string(),
            meta: None,
        };
        self.request(methods::RESOURCES_READ, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn subscribe_resource(&self, uri: &str) -> McpResult<()> {
        self.ensure_initialized()?;
        let params = SubscribeParams {
            uri: uri.to_string(),
            meta: None,
        };
        let _: EmptyResult = self
            .request(
                methods::RESOURCES_SUBSCRIBE,
                Some(serde_json::to_value(&params)?),
            )
            .await?;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: &str) -> McpResult<()> {
        self.ensure_initialized()?;
        let params = UnsubscribeParams {
            uri: uri.to_string(),
            meta: None,
        };
        let _: EmptyResult = self
            .request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(serde_json::to_value(&params)?),
            )
            .await?;
        Ok(())
    }

    pub async fn list_prompts(&self, cursor: Option<String>) -> McpResult<ListPromptsResult> {
        self.ensure_initialized()?;
        let params = PaginatedParams { cursor, meta: None };
        self.request(methods::PROMPTS_LIST, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        self.ensure_initialized()?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
            meta: None,
        };
        self.request(methods::PROMPTS_GET, Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        self.ensure_initialized()?;
        let params = SetLevelParams { level, meta: None };
        let _: EmptyResult = self
            .request(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::to_value(&params)?),
            )
            .await?;
        Ok(())
    }

    pub async fn complete(&self, params: CompleteParams) -> McpResult<CompleteResult> {
        self.ensure_initialized()?;
        self.request(
            methods::COMPLETION_COMPLETE,
            Some(serde_json::to_value(&params)?),
        )
        .await
    }
}

/// Build the reply frame for a server-initiated request.
async fn answer_server_request(
    sampling: Option<&Arc<dyn SamplingHandler>>,
    request: JsonRpcRequest,
) -> JsonRpcMessage {
    if request.method != methods::SAMPLING_CREATE_MESSAGE {
        return JsonRpcMessage::Error(JsonRpcError::new(
            Some(request.id),
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {}", request.method),
        ));
    }

    let Some(handler) = sampling else {
        return JsonRpcMessage::Error(JsonRpcError::new(
            Some(request.id),
            error_codes::METHOD_NOT_FOUND,
            "no handler configured",
        ));
    };

    let params = match serde_json::from_value::<CreateMessageParams>(
        request.params.clone().unwrap_or(Value::Null),
    ) {
        Ok(params) => params,
        Err(err) => {
            return JsonRpcMessage::Error(JsonRpcError::new(
                Some(request.id),
                error_codes::INVALID_PARAMS,
                err.to_string(),
            ));
        }
    };

    match handler.create_message(params).await {
        Ok(result) => match serde_json::to_value(result) {
            Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(request.id, value)),
            Err(err) => JsonRpcMessage::Error(JsonRpcError::new(
                Some(request.id),
                error_codes::INTERNAL_ERROR,
                err.to_string(),
            )),
        },
        Err(err) => JsonRpcMessage::Error(JsonRpcError::new(
            Some(request.id),
            error_codes::INTERNAL_ERROR,
            err.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport stub with scripted replies.
    struct ScriptedTransport {
        replies: Mutex<HashMap<String, Value>>,
        sent: Mutex<Vec<JsonRpcRequest>>,
        protocol_version: Mutex<Option<String>>,
        pending_server_request: Mutex<Option<JsonRpcRequest>>,
        responses: Arc<Mutex<Vec<JsonRpcMessage>>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                protocol_version: Mutex::new(None),
                pending_server_request: Mutex::new(None),
                responses: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn script(&self, method: &str, result: Value) {
            self.replies
                .lock()
                .unwrap()
                .insert(method.to_string(), result);
        }

        fn init_result(version: &str) -> Value {
            json!({
                "protocolVersion": version,
                "capabilities": {"tools": {"listChanged": true}},
                "serverInfo": {"name": "srv", "version": "1"}
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcMessage> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(&request.method)
                .cloned()
                .ok_or_else(|| McpError::MethodNotFound(request.method.clone()))?;
            let id = request.id.clone();
            self.sent.lock().unwrap().push(request);
            Ok(JsonRpcMessage::Response(JsonRpcResponse::new(id, reply)))
        }

        async fn send_notification(&self, _notification: JsonRpcNotification) -> McpResult<()> {
            Ok(())
        }

        async fn receive_notification(&self) -> McpResult<Option<JsonRpcNotification>> {
            Ok(None)
        }

        async fn receive_server_request(&self) -> McpResult<Option<JsonRpcRequest>> {
            Ok(self.pending_server_request.lock().unwrap().take())
        }

        async fn send_response(&self, response: JsonRpcMessage) -> McpResult<()> {
            self.responses.lock().unwrap().push(response);
            Ok(())
        }

        fn set_protocol_version(&self, version: &str) {
            *self.protocol_version.lock().unwrap() = Some(version.to_string());
        }

        async fn close(&self) -> McpResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn initialize_validates_and_propagates_the_version() {
        let transport = ScriptedTransport::new();
        transport.script(
            methods::INITIALIZE,
            ScriptedTransport::init_result("2025-03-26"),
        );
        let client = McpClient::new(transport, "test-client", "1.0");

        let result = client.initialize().await.unwrap();
        assert_eq!(result.protocol_version, "2025-03-26");
        assert_eq!(client.negotiated_version().as_deref(), Some("2025-03-26"));
        assert_eq!(
            client
                .transport()
                .protocol_version
                .lock()
                .unwrap()
                .as_deref(),
            Some("2025-03-26")
        );
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_server_version_is_a_distinct_error() {
        let transport = ScriptedTransport::new();
        transport.script(
            methods::INITIALIZE,
            ScriptedTransport::init_result("1999-01-01"),
        );
        let client = McpClient::new(transport, "test-client", "1.0");

        match client.initialize().await {
            Err(McpError::UnsupportedProtocolVersion(version)) => {
                assert_eq!(version, "1999-01-01");
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verbs_require_initialization() {
        let transport = ScriptedTransport::new();
        let client = McpClient::new(transport, "test-client", "1.0");
        let err = client.list_tools(None).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn sampling_capability_advertised_only_with_handler() {
        let transport = ScriptedTransport::new();
        transport.script(
            methods::INITIALIZE,
            ScriptedTransport::init_result("2025-06-18"),
        );
        let mut client = McpClient::new(transport, "test-client", "1.0");
        client.set_sampling_handler(SamplingFn(|_params| async {
            Ok(CreateMessageResult {
                role: Role::Assistant,
                content: Content::text("ok"),
                model: "m".to_string(),
                stop_reason: None,
            })
        }));
        client.initialize().await.unwrap();

        let sent = client.transport().sent.lock().unwrap().clone();
        let init = sent
            .iter()
            .find(|r| r.method == methods::INITIALIZE)
            .unwrap();
        assert!(init.params.as_ref().unwrap()["capabilities"]["sampling"].is_object());
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn reverse_request_without_handler_yields_method_not_found() {
        let reply = answer_server_request(
            None,
            JsonRpcRequest::new(7, methods::SAMPLING_CREATE_MESSAGE, None),
        )
        .await;
        match reply {
            JsonRpcMessage::Error(error) => {
                assert_eq!(error.error.code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(error.error.message, "no handler configured");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_loop_answers_sampling_requests() {
        let transport = ScriptedTransport::new();
        transport.script(
            methods::INITIALIZE,
            ScriptedTransport::init_result("2025-06-18"),
        );
        let responses = transport.responses.clone();
        *transport.pending_server_request.lock().unwrap() = Some(JsonRpcRequest::new(
            99,
            methods::SAMPLING_CREATE_MESSAGE,
            Some(json!({"messages": [], "maxTokens": 5})),
        ));

        let mut client = McpClient::new(transport, "test-client", "1.0");
        client.set_sampling_handler(SamplingFn(|_params| async {
            Ok(CreateMessageResult {
                role: Role::Assistant,
                content: Content::text("sampled"),
                model: "test-model".to_string(),
                stop_reason: Some("endTurn".to_string()),
            })
        }));
        client.initialize().await.unwrap();

        // Give the service loop a few polls to pick up the request.
        for _ in 0..50 {
            if !responses.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let answered = responses.lock().unwrap().clone();
        assert_eq!(answered.len(), 1);
        match &answered[0] {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.id, RequestId::from(99));
                assert_eq!(response.result["model"], json!("test-model"));
            }
            other => panic!("expected response, got {other:?}"),
        }
        client.close().await.unwrap();
    }
}
