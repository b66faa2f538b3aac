//! # weave-mcp-rs
//!
//! A full implementation of the [Model Context Protocol](https://modelcontextprotocol.io/):
//! a reusable server runtime, a matching client runtime, and three
//! interchangeable transports (StdIO, legacy SSE, Streamable HTTP).
//!
//! ## Server example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weave_mcp_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let server = Arc::new(McpServer::new("echo-server", "1.0.0"));
//!     server
//!         .add_tool(
//!             ToolBuilder::new("echo")
//!                 .description("Echo a message back")
//!                 .with_string("message", true, "The message to echo")
//!                 .build(),
//!             ToolFn(|args: ToolArguments, _ctx| async move {
//!                 Ok(CallToolResult::text(args.get_string_or("message", "hello")))
//!             }),
//!         )
//!         .await;
//!
//!     StdioServerTransport::new(server).serve().await
//! }
//! ```
//!
//! ## Client example
//!
//! ```rust,no_run
//! use weave_mcp_rs::prelude::*;
//!
//! # #[cfg(feature = "http")]
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let transport = StreamableHttpClientTransport::new("http://localhost:3000/mcp");
//!     let client = McpClient::new(transport, "demo-client", "0.1.0");
//!     client.initialize().await?;
//!     let tools = client.list_tools(None).await?;
//!     println!("{} tools", tools.tools.len());
//!     client.close().await
//! }
//! # #[cfg(not(feature = "http"))]
//! # fn main() {}
//! ```
//!
//! ## Module layout
//!
//! - [`protocol`]: wire types, method names, and the frame codec
//! - [`core`]: errors, argument access, and handler traits
//! - [`server`]: the protocol engine, session registry, and hooks
//! - [`client`]: the client runtime
//! - [`transport`]: the three transports, server and client halves
//! - [`auth`]: token-source boundary and PKCE for the HTTP transports
//! - [`utils`]: URI template matching

#[cfg(feature = "http")]
pub mod auth;
pub mod client;
pub mod core;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod utils;

pub use crate::core::error::{McpError, McpResult};

/// Commonly used types and traits in one import.
pub mod prelude {
    pub use crate::core::arguments::ToolArguments;
    pub use crate::core::completion::{CompletionHandler, StaticCompletionHandler};
    pub use crate::core::error::{McpError, McpResult};
    pub use crate::core::prompt::{PromptFn, PromptHandler};
    pub use crate::core::resource::{ResourceFn, ResourceHandler};
    pub use crate::core::tool::{ToolBuilder, ToolFn, ToolHandler};

    pub use crate::protocol::messages::*;
    pub use crate::protocol::methods;
    pub use crate::protocol::types::*;

    pub use crate::server::{
        ClientSession, Hooks, McpServer, RequestContext, ServerOptions, ToolContext,
    };

    pub use crate::client::{McpClient, SamplingFn, SamplingHandler};

    pub use crate::transport::{ClientTransportConfig, Transport};

    #[cfg(feature = "stdio")]
    pub use crate::transport::{StdioClientTransport, StdioConfig, StdioServerTransport};

    #[cfg(feature = "http")]
    pub use crate::auth::{PkcePair, StaticTokenSource, TokenSource};
    #[cfg(feature = "http")]
    pub use crate::transport::{
        SseClientTransport, SseServerConfig, SseServerTransport, StreamableHttpClientTransport,
        StreamableHttpServerConfig, StreamableHttpServerTransport,
    };

    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_exports_are_reachable() {
        let _error = McpError::NoActiveSession;
    }
}
