//! Resource abstraction: read handlers for concrete resources and for
//! URI-template resources whose captured variables become arguments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::McpResult;
use crate::protocol::types::{Resource, ResourceContents, ResourceTemplate};
use crate::server::context::RequestContext;

/// Implemented by anything that can serve `resources/read`.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`. For template resources, `params` holds
    /// the variables captured from the URI template match; for concrete
    /// resources it is empty.
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
        ctx: &RequestContext,
    ) -> McpResult<Vec<ResourceContents>>;
}

/// Closure adapter for resource handlers.
pub struct ResourceFn<F>(pub F);

#[async_trait]
impl<F, Fut> ResourceHandler for ResourceFn<F>
where
    F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<Vec<ResourceContents>>> + Send,
{
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
        _ctx: &RequestContext,
    ) -> McpResult<Vec<ResourceContents>> {
        (self.0)(uri.to_string(), params.clone()).await
    }
}

/// A concrete resource plus its handler, as stored in the registry.
#[derive(Clone)]
pub struct RegisteredResource {
    pub resource: Resource,
    pub handler: Arc<dyn ResourceHandler>,
}

impl RegisteredResource {
    pub fn new<H: ResourceHandler + 'static>(resource: Resource, handler: H) -> Self {
        Self {
            resource,
            handler: Arc::new(handler),
        }
    }
}

/// A resource template plus its handler.
#[derive(Clone)]
pub struct RegisteredResourceTemplate {
    pub template: ResourceTemplate,
    pub handler: Arc<dyn ResourceHandler>,
}

impl RegisteredResourceTemplate {
    pub fn new<H: ResourceHandler + 'static>(template: ResourceTemplate, handler: H) -> Self {
        Self {
            template,
            handler: Arc::new(handler),
        }
    }
}
