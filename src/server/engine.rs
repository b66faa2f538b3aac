//! The protocol engine: transport-agnostic request dispatch, registries,
//! notification fan-out, and reverse sampling.
//!
//! Transports decode frames off the wire, look up or create a session, and
//! hand both to [`McpServer::dispatch`]. The engine owns the tool, resource,
//! resource-template, and prompt registries, the session registry, and the
//! per-session mutable state reached through capability accessors on
//! [`ClientSession`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::arguments::ToolArguments;
use crate::core::completion::CompletionHandler;
use crate::core::error::{McpError, McpResult};
use crate::core::prompt::{PromptHandler, RegisteredPrompt};
use crate::core::resource::{
    RegisteredResource, RegisteredResourceTemplate, ResourceHandler,
};
use crate::core::tool::{RegisteredTool, ToolHandler};
use crate::protocol::messages::*;
use crate::protocol::types::*;
use crate::protocol::{codec, methods};
use crate::server::context::RequestContext;
use crate::server::hooks::Hooks;
use crate::server::session::{ClientSession, SessionRegistry};
use crate::utils::uri::UriTemplate;

/// Engine-level options, set once at construction.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Free-text usage instructions returned from `initialize`.
    pub instructions: Option<String>,
    /// Page size for the list methods. `None` disables pagination.
    pub pagination_limit: Option<usize>,
    /// Advertise and serve reverse `sampling/createMessage`.
    pub sampling_enabled: bool,
    /// Advertise the logging capability and accept `logging/setLevel`.
    pub logging_enabled: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            instructions: None,
            pagination_limit: None,
            sampling_enabled: false,
            logging_enabled: true,
        }
    }
}

/// The MCP server engine.
pub struct McpServer {
    info: Implementation,
    options: ServerOptions,
    tools: RwLock<HashMap<String, RegisteredTool>>,
    resources: RwLock<HashMap<String, RegisteredResource>>,
    templates: RwLock<HashMap<String, RegisteredResourceTemplate>>,
    prompts: RwLock<HashMap<String, RegisteredPrompt>>,
    completions: RwLock<HashMap<String, Arc<dyn CompletionHandler>>>,
    /// uri -> ids of sessions subscribed via `resources/subscribe`.
    subscriptions: std::sync::RwLock<HashMap<String, HashSet<String>>>,
    sessions: SessionRegistry,
    hooks: Hooks,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_options(name, version, ServerOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        version: impl Into<String>,
        options: ServerOptions,
    ) -> Self {
        Self {
            info: Implementation::new(name, version),
            options,
            tools: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
            templates: RwLock::new(HashMap::new()),
            prompts: RwLock::new(HashMap::new()),
            completions: RwLock::new(HashMap::new()),
            subscriptions: std::sync::RwLock::new(HashMap::new()),
            sessions: SessionRegistry::new(),
            hooks: Hooks::new(),
        }
    }

    /// Attach lifecycle hooks. Call before the server starts serving.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ========================================================================
    // Registry management
    // ========================================================================

    /// Register a tool. Replacing an existing name is allowed; either way
    /// every initialized session learns through `tools/list_changed`.
    pub async fn add_tool<H: ToolHandler + 'static>(&self, tool: Tool, handler: H) {
        {
            let mut tools = self.tools.write().await;
            tools.insert(tool.name.clone(), RegisteredTool::new(tool, handler));
        }
        self.notify_tools_list_changed();
    }

    pub async fn remove_tool(&self, name: &str) -> bool {
        let removed = {
            let mut tools = self.tools.write().await;
            tools.remove(name).is_some()
        };
        if removed {
            self.notify_tools_list_changed();
        }
        removed
    }

    /// Register a concrete resource. Re-registering an existing URI counts
    /// as a change: subscribers of that URI get `resources/updated`.
    pub async fn add_resource<H: ResourceHandler + 'static>(&self, resource: Resource, handler: H) {
        let uri = resource.uri.clone();
        let replaced = {
            let mut resources = self.resources.write().await;
            resources
                .insert(uri.clone(), RegisteredResource::new(resource, handler))
                .is_some()
        };
        if replaced {
            self.notify_resource_updated(&uri);
        }
        self.notify_resources_list_changed();
    }

    pub async fn remove_resource(&self, uri: &str) -> bool {
        let removed = {
            let mut resources = self.resources.write().await;
            resources.remove(uri).is_some()
        };
        if removed {
            self.notify_resources_list_changed();
        }
        removed
    }

    /// Register a resource template. The URI template is validated here so
    /// a bad pattern fails at startup, not on first read.
    pub async fn add_resource_template<H: ResourceHandler + 'static>(
        &self,
        template: ResourceTemplate,
        handler: H,
    ) -> McpResult<()> {
        UriTemplate::parse(&template.uri_template)?;
        {
            let mut templates = self.templates.write().await;
            templates.insert(
                template.name.clone(),
                RegisteredResourceTemplate::new(template, handler),
            );
        }
        self.notify_resources_list_changed();
        Ok(())
    }

    pub async fn add_prompt<H: PromptHandler + 'static>(&self, prompt: Prompt, handler: H) {
        {
            let mut prompts = self.prompts.write().await;
            prompts.insert(prompt.name.clone(), RegisteredPrompt::new(prompt, handler));
        }
        self.notify_prompts_list_changed();
    }

    pub async fn remove_prompt(&self, name: &str) -> bool {
        let removed = {
            let mut prompts = self.prompts.write().await;
            prompts.remove(name).is_some()
        };
        if removed {
            self.notify_prompts_list_changed();
        }
        removed
    }

    /// Register a completion handler for `ref/prompt` or `ref/resource`.
    pub async fn add_completion_handler<H: CompletionHandler + 'static>(
        &self,
        kind: &str,
        handler: H,
    ) {
        let mut completions = self.completions.write().await;
        completions.insert(kind.to_string(), Arc::new(handler));
    }

    /// Install a session-scoped tool that shadows the global registry for
    /// that session only.
    pub async fn add_session_tool<H: ToolHandler + 'static>(
        &self,
        session_id: &str,
        tool: Tool,
        handler: H,
    ) -> McpResult<()> {
        let session = self
            .sessions
            .lookup(session_id)
            .ok_or_else(|| McpError::SessionNotFound(session_id.to_string()))?;
        let overrides = session.tool_overrides().ok_or_else(|| {
            McpError::internal("session does not support per-session tools")
        })?;
        overrides.set(RegisteredTool::new(tool, handler));
        let _ = self.send_notification_to_client(session_id, methods::TOOLS_LIST_CHANGED, None);
        Ok(())
    }

    pub async fn delete_session_tools(&self, session_id: &str, names: &[&str]) -> McpResult<()> {
        let session = self
            .sessions
            .lookup(session_id)
            .ok_or_else(|| McpError::SessionNotFound(session_id.to_string()))?;
        let overrides = session.tool_overrides().ok_or_else(|| {
            McpError::internal("session does not support per-session tools")
        })?;
        overrides.delete(names);
        let _ = self.send_notification_to_client(session_id, methods::TOOLS_LIST_CHANGED, None);
        Ok(())
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Called by transports at connection time.
    pub fn register_session(&self, session: Arc<dyn ClientSession>) {
        let id = session.id().to_string();
        self.sessions.register(session);
        self.hooks.fire_register_session(&id);
        tracing::debug!(session = %id, "session registered");
    }

    /// Called by transports on disconnect. Drops the session's resource
    /// subscriptions and wakes any pending sampling waiters.
    pub fn unregister_session(&self, id: &str) {
        if self.sessions.unregister(id).is_some() {
            let mut subscriptions = self.subscriptions.write().expect("subscriptions lock");
            for subscribers in subscriptions.values_mut() {
                subscribers.remove(id);
            }
            subscriptions.retain(|_, subscribers| !subscribers.is_empty());
            drop(subscriptions);

            self.hooks.fire_unregister_session(id);
            tracing::debug!(session = %id, "session unregistered");
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Enqueue a notification to one session. Fails fast when the session's
    /// queue is full or the session is gone.
    pub fn send_notification_to_client(
        &self,
        session_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<()> {
        let session = self
            .sessions
            .lookup(session_id)
            .ok_or_else(|| McpError::SessionNotFound(session_id.to_string()))?;
        session.enqueue(JsonRpcMessage::Notification(JsonRpcNotification::new(
            method, params,
        )))
    }

    /// Enqueue a notification to every initialized session. Sessions with a
    /// full queue are skipped, never waited on.
    pub fn send_notification_to_all_clients(&self, method: &str, params: Option<Value>) {
        self.sessions.for_each(|session| {
            if !session.is_initialized() {
                return;
            }
            let frame = JsonRpcMessage::Notification(JsonRpcNotification::new(
                method,
                params.clone(),
            ));
            if let Err(err) = session.enqueue(frame) {
                tracing::warn!(session = %session.id(), %err, "dropping broadcast notification");
            }
        });
    }

    /// Emit `notifications/message` to one session, honoring its minimum
    /// level. Messages below the threshold are dropped silently.
    pub fn send_log_message_to_client(
        &self,
        session_id: &str,
        level: LoggingLevel,
        logger: Option<&str>,
        data: Value,
    ) -> McpResult<()> {
        let session = self
            .sessions
            .lookup(session_id)
            .ok_or_else(|| McpError::SessionNotFound(session_id.to_string()))?;
        if let Some(slot) = session.log_level() {
            if level < slot.get() {
                return Ok(());
            }
        }
        let params = LoggingMessageParams {
            level,
            logger: logger.map(str::to_string),
            data,
        };
        session.enqueue(JsonRpcMessage::Notification(JsonRpcNotification::new(
            methods::LOGGING_MESSAGE,
            Some(serde_json::to_value(params)?),
        )))
    }

    /// Notify subscribers of one resource that it changed.
    pub fn notify_resource_updated(&self, uri: &str) {
        let subscribers: Vec<String> = {
            let subscriptions = self.subscriptions.read().expect("subscriptions lock");
            subscriptions
                .get(uri)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        };
        for session_id in subscribers {
            let params = ResourceUpdatedParams {
                uri: uri.to_string(),
            };
            let params = serde_json::to_value(params).expect("static shape");
            if let Err(err) =
                self.send_notification_to_client(&session_id, methods::RESOURCES_UPDATED, Some(params))
            {
                tracing::warn!(session = %session_id, %err, "dropping resources/updated");
            }
        }
    }

    fn notify_tools_list_changed(&self) {
        self.send_notification_to_all_clients(methods::TOOLS_LIST_CHANGED, None);
    }

    fn notify_resources_list_changed(&self) {
        self.send_notification_to_all_clients(methods::RESOURCES_LIST_CHANGED, None);
    }

    fn notify_prompts_list_changed(&self) {
        self.send_notification_to_all_clients(methods::PROMPTS_LIST_CHANGED, None);
    }

    // ========================================================================
    // Reverse sampling
    // ========================================================================

    /// Issue `sampling/createMessage` on a session picked by id. `None` (no
    /// connected session) fails with [`McpError::NoActiveSession`], as does
    /// an id naming a session without the sampling capability.
    pub async fn request_sampling(
        &self,
        session_id: Option<&str>,
        params: CreateMessageParams,
        timeout: Duration,
    ) -> McpResult<CreateMessageResult> {
        let id = session_id.ok_or(McpError::NoActiveSession)?;
        let session = self.sessions.lookup(id).ok_or(McpError::NoActiveSession)?;
        let bridge = session.sampling().ok_or(McpError::NoActiveSession)?;
        bridge.request(serde_json::to_value(params)?, timeout).await
    }

    /// Route a client's response frame to the sampling waiter it answers.
    /// Transports call this for inbound frames that are responses rather
    /// than requests.
    pub fn route_client_response(
        &self,
        session: &Arc<dyn ClientSession>,
        message: &JsonRpcMessage,
    ) -> McpResult<()> {
        let bridge = session
            .sampling()
            .ok_or_else(|| McpError::internal("session has no pending reverse requests"))?;
        match message {
            JsonRpcMessage::Response(response) => {
                let result = serde_json::from_value::<CreateMessageResult>(response.result.clone())
                    .map_err(|e| McpError::invalid_params(format!("sampling result: {e}")));
                bridge.resolve(&response.id, result)
            }
            JsonRpcMessage::Error(error) => {
                let id = error
                    .id
                    .as_ref()
                    .ok_or_else(|| McpError::invalid_params("error frame without id"))?;
                bridge.resolve(
                    id,
                    Err(McpError::Rpc {
                        code: error.error.code,
                        message: error.error.message.clone(),
                    }),
                )
            }
            _ => Err(McpError::invalid_params("not a response frame")),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Decode and dispatch one raw frame. Returns the reply frame for
    /// requests and parse failures; notifications and routed responses
    /// produce `None`.
    pub async fn handle_message(
        self: &Arc<Self>,
        session: &Arc<dyn ClientSession>,
        raw: &[u8],
        headers: HashMap<String, String>,
    ) -> Option<JsonRpcMessage> {
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(McpError::Parse(detail)) => {
                return Some(JsonRpcMessage::Error(JsonRpcError::new(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("request body is not valid json: {detail}"),
                )));
            }
            Err(err) => {
                return Some(JsonRpcMessage::Error(JsonRpcError::new(
                    None,
                    error_codes::INVALID_REQUEST,
                    err.to_string(),
                )));
            }
        };
        self.dispatch(session, message, headers).await
    }

    /// Dispatch one decoded frame.
    pub async fn dispatch(
        self: &Arc<Self>,
        session: &Arc<dyn ClientSession>,
        message: JsonRpcMessage,
        headers: HashMap<String, String>,
    ) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => {
                Some(self.handle_request(session, request, headers).await)
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(session, notification);
                None
            }
            response => {
                if let Err(err) = self.route_client_response(session, &response) {
                    tracing::warn!(session = %session.id(), %err, "unroutable response frame");
                }
                None
            }
        }
    }

    fn handle_notification(&self, session: &Arc<dyn ClientSession>, n: JsonRpcNotification) {
        match n.method.as_str() {
            methods::INITIALIZED => {
                session.mark_initialized();
                tracing::debug!(session = %session.id(), "session ready");
            }
            other => {
                tracing::trace!(session = %session.id(), method = %other, "ignoring notification");
            }
        }
    }

    async fn handle_request(
        self: &Arc<Self>,
        session: &Arc<dyn ClientSession>,
        request: JsonRpcRequest,
        headers: HashMap<String, String>,
    ) -> JsonRpcMessage {
        let method = request.method.clone();
        let id = request.id.clone();
        self.hooks.fire_before_method(session.id(), &method);

        let meta = request
            .params
            .as_ref()
            .and_then(|p| p.get("_meta"))
            .and_then(|m| serde_json::from_value::<Meta>(m.clone()).ok());
        let ctx = RequestContext::new(self.clone(), session.clone(), meta, headers);

        let result = self.serve(session, &ctx, &method, request.params).await;
        self.hooks.fire_after_method(session.id(), &method);

        match result {
            Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(id, value)),
            Err(err) => {
                self.hooks.fire_error(&method, &err);
                tracing::debug!(method = %method, %err, "request failed");
                JsonRpcMessage::Error(JsonRpcError::new(
                    Some(id),
                    err.jsonrpc_code(),
                    err.to_string(),
                ))
            }
        }
    }

    async fn serve(
        self: &Arc<Self>,
        session: &Arc<dyn ClientSession>,
        ctx: &RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<Value> {
        if !session.is_initialized()
            && method != methods::INITIALIZE
            && method != methods::PING
        {
            return Err(McpError::NotInitialized);
        }

        match method {
            methods::INITIALIZE => self.handle_initialize(parse_params(params)?),
            methods::PING => codec::encode_value(&EmptyResult::default()),
            methods::TOOLS_LIST => {
                self.handle_tools_list(session, parse_optional(params)?).await
            }
            methods::TOOLS_CALL => self.handle_tools_call(session, ctx, parse_params(params)?).await,
            methods::RESOURCES_LIST => self.handle_resources_list(parse_optional(params)?).await,
            methods::RESOURCES_TEMPLATES_LIST => {
                self.handle_templates_list(parse_optional(params)?).await
            }
            methods::RESOURCES_READ => self.handle_resources_read(ctx, parse_params(params)?).await,
            methods::RESOURCES_SUBSCRIBE => {
                let params: SubscribeParams = parse_params(params)?;
                self.subscribe(session.id(), &params.uri);
                codec::encode_value(&EmptyResult::default())
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let params: UnsubscribeParams = parse_params(params)?;
                self.unsubscribe(session.id(), &params.uri);
                codec::encode_value(&EmptyResult::default())
            }
            methods::PROMPTS_LIST => self.handle_prompts_list(parse_optional(params)?).await,
            methods::PROMPTS_GET => self.handle_prompts_get(ctx, parse_params(params)?).await,
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelParams = parse_params(params)?;
                if let Some(slot) = session.log_level() {
                    slot.set(params.level);
                }
                codec::encode_value(&EmptyResult::default())
            }
            methods::COMPLETION_COMPLETE => self.handle_complete(parse_params(params)?).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    // ========================================================================
    // Method handlers
    // ========================================================================

    fn handle_initialize(&self, params: InitializeParams) -> McpResult<Value> {
        let requested = params.protocol_version.as_str();
        let negotiated = if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            requested
        } else {
            LATEST_PROTOCOL_VERSION
        };
        tracing::debug!(
            client = %params.client_info.name,
            requested = %requested,
            negotiated = %negotiated,
            "initialize"
        );

        let result = InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: self.capabilities(),
            server_info: self.info.clone(),
            instructions: self.options.instructions.clone(),
            meta: None,
        };
        codec::encode_value(&result)
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(true),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            prompts: Some(PromptsCapability {
                list_changed: Some(true),
            }),
            logging: self.options.logging_enabled.then(LoggingCapability::default),
            sampling: self.options.sampling_enabled.then(SamplingCapability::default),
            completions: Some(CompletionsCapability::default()),
            experimental: None,
        }
    }

    async fn handle_tools_list(
        &self,
        session: &Arc<dyn ClientSession>,
        params: PaginatedParams,
    ) -> McpResult<Value> {
        let base = {
            let tools = self.tools.read().await;
            tools.clone()
        };
        let merged = match session.tool_overrides() {
            Some(overrides) => overrides.merged(base),
            None => base,
        };
        let entries: Vec<(String, Tool)> = merged
            .into_iter()
            .map(|(name, registered)| (name, registered.tool))
            .collect();
        let (tools, next_cursor) = self.paginate(entries, params.cursor.as_deref())?;
        codec::encode_value(&ListToolsResult { tools, next_cursor })
    }

    async fn handle_tools_call(
        &self,
        session: &Arc<dyn ClientSession>,
        ctx: &RequestContext,
        params: CallToolParams,
    ) -> McpResult<Value> {
        let registered = {
            let from_session = session
                .tool_overrides()
                .and_then(|overrides| overrides.get(&params.name));
            match from_session {
                Some(tool) => Some(tool),
                None => {
                    let tools = self.tools.read().await;
                    tools.get(&params.name).cloned()
                }
            }
        }
        .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        // Argument and handler failures are data: the client gets an
        // is_error result it can render, not an RPC fault.
        let result = match ToolArguments::from_value(params.arguments) {
            Ok(args) => match registered.handler.call(args, ctx.clone()).await {
                Ok(result) => self.check_structured_content(&registered.tool, result),
                Err(err) => CallToolResult::error(err.to_string()),
            },
            Err(err) => CallToolResult::error(err.to_string()),
        };

        codec::encode_value(&result)
    }

    /// Shallow validation of the structured-content contract: when the tool
    /// advertises an output schema, a successful result must carry an object
    /// with the schema's required keys.
    fn check_structured_content(&self, tool: &Tool, result: CallToolResult) -> CallToolResult {
        let Some(schema) = &tool.output_schema else {
            return result;
        };
        if result.is_error {
            return result;
        }
        let Some(structured) = &result.structured_content else {
            return CallToolResult::error(format!(
                "tool {} declares an output schema but returned no structured content",
                tool.name
            ));
        };
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if structured.get(key).is_none() {
                    return CallToolResult::error(format!(
                        "structured content is missing required field {key}"
                    ));
                }
            }
        }
        result
    }

    async fn handle_resources_list(&self, params: PaginatedParams) -> McpResult<Value> {
        let entries: Vec<(String, Resource)> = {
            let resources = self.resources.read().await;
            resources
                .values()
                .map(|r| (r.resource.name.clone(), r.resource.clone()))
                .collect()
        };
        let (resources, next_cursor) = self.paginate(entries, params.cursor.as_deref())?;
        codec::encode_value(&ListResourcesResult {
            resources,
            next_cursor,
        })
    }

    async fn handle_templates_list(&self, params: PaginatedParams) -> McpResult<Value> {
        let entries: Vec<(String, ResourceTemplate)> = {
            let templates = self.templates.read().await;
            templates
                .values()
                .map(|t| (t.template.name.clone(), t.template.clone()))
                .collect()
        };
        let (resource_templates, next_cursor) = self.paginate(entries, params.cursor.as_deref())?;
        codec::encode_value(&ListResourceTemplatesResult {
            resource_templates,
            next_cursor,
        })
    }

    async fn handle_resources_read(
        &self,
        ctx: &RequestContext,
        params: ReadResourceParams,
    ) -> McpResult<Value> {
        let uri = params.uri;

        let direct = {
            let resources = self.resources.read().await;
            resources.get(&uri).cloned()
        };
        if let Some(registered) = direct {
            let contents = registered.handler.read(&uri, &HashMap::new(), ctx).await?;
            return codec::encode_value(&ReadResourceResult { contents });
        }

        let matched = {
            let templates = self.templates.read().await;
            templates.values().cloned().collect::<Vec<_>>()
        };
        for registered in matched {
            let template = UriTemplate::parse(&registered.template.uri_template)?;
            if let Some(vars) = template.matches(&uri) {
                let contents = registered.handler.read(&uri, &vars, ctx).await?;
                return codec::encode_value(&ReadResourceResult { contents });
            }
        }

        Err(McpError::ResourceNotFound(uri))
    }

    async fn handle_prompts_list(&self, params: PaginatedParams) -> McpResult<Value> {
        let entries: Vec<(String, Prompt)> = {
            let prompts = self.prompts.read().await;
            prompts
                .values()
                .map(|p| (p.prompt.name.clone(), p.prompt.clone()))
                .collect()
        };
        let (prompts, next_cursor) = self.paginate(entries, params.cursor.as_deref())?;
        codec::encode_value(&ListPromptsResult {
            prompts,
            next_cursor,
        })
    }

    async fn handle_prompts_get(
        &self,
        ctx: &RequestContext,
        params: GetPromptParams,
    ) -> McpResult<Value> {
        let registered = {
            let prompts = self.prompts.read().await;
            prompts.get(&params.name).cloned()
        }
        .ok_or_else(|| McpError::PromptNotFound(params.name.clone()))?;

        let result = registered
            .handler
            .get(params.arguments.unwrap_or_default(), ctx)
            .await?;
        codec::encode_value(&result)
    }

    async fn handle_complete(&self, params: CompleteParams) -> McpResult<Value> {
        let handler = {
            let completions = self.completions.read().await;
            completions.get(params.reference.kind()).cloned()
        };
        let completion = match handler {
            Some(handler) => {
                handler
                    .complete(&params.reference, &params.argument)
                    .await?
            }
            None => Completion::default(),
        };
        codec::encode_value(&CompleteResult { completion })
    }

    // ========================================================================
    // Subscriptions and pagination
    // ========================================================================

    fn subscribe(&self, session_id: &str, uri: &str) {
        let mut subscriptions = self.subscriptions.write().expect("subscriptions lock");
        subscriptions
            .entry(uri.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    fn unsubscribe(&self, session_id: &str, uri: &str) {
        let mut subscriptions = self.subscriptions.write().expect("subscriptions lock");
        if let Some(subscribers) = subscriptions.get_mut(uri) {
            subscribers.remove(session_id);
            if subscribers.is_empty() {
                subscriptions.remove(uri);
            }
        }
    }

    /// Name-ordered pagination with an opaque cursor: base64 of the last
    /// name on the previous page.
    fn paginate<T>(
        &self,
        mut entries: Vec<(String, T)>,
        cursor: Option<&str>,
    ) -> McpResult<(Vec<T>, Option<String>)> {
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let start = match cursor {
            Some(cursor) => {
                let last = BASE64
                    .decode(cursor)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .ok_or_else(|| McpError::invalid_params("invalid cursor"))?;
                entries
                    .iter()
                    .position(|(name, _)| name.as_str() > last.as_str())
                    .unwrap_or(entries.len())
            }
            None => 0,
        };

        let limit = self.options.pagination_limit.unwrap_or(usize::MAX);
        let end = start.saturating_add(limit).min(entries.len());
        let next_cursor = if end < entries.len() && end > 0 {
            Some(BASE64.encode(entries[end - 1].0.as_bytes()))
        } else {
            None
        };

        let page = entries
            .drain(..)
            .skip(start)
            .take(end - start)
            .map(|(_, item)| item)
            .collect();
        Ok((page, next_cursor))
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let value = params.unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn parse_optional<T: DeserializeOwned + Default>(params: Option<Value>) -> McpResult<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
        }
    }
}
