//! Prompt abstraction: reusable message templates rendered per request.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::McpResult;
use crate::protocol::messages::GetPromptResult;
use crate::protocol::types::Prompt;
use crate::server::context::RequestContext;

/// Implemented by anything that can serve `prompts/get`.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        arguments: HashMap<String, String>,
        ctx: &RequestContext,
    ) -> McpResult<GetPromptResult>;
}

/// Closure adapter for prompt handlers.
pub struct PromptFn<F>(pub F);

#[async_trait]
impl<F, Fut> PromptHandler for PromptFn<F>
where
    F: Fn(HashMap<String, String>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<GetPromptResult>> + Send,
{
    async fn get(
        &self,
        arguments: HashMap<String, String>,
        _ctx: &RequestContext,
    ) -> McpResult<GetPromptResult> {
        (self.0)(arguments).await
    }
}

/// A prompt definition paired with its handler.
#[derive(Clone)]
pub struct RegisteredPrompt {
    pub prompt: Prompt,
    pub handler: Arc<dyn PromptHandler>,
}

impl RegisteredPrompt {
    pub fn new<H: PromptHandler + 'static>(prompt: Prompt, handler: H) -> Self {
        Self {
            prompt,
            handler: Arc::new(handler),
        }
    }
}
