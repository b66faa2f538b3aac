//! Transport layer: StdIO, legacy SSE, and Streamable HTTP.
//!
//! Server halves accept connections, mint sessions, and feed frames to the
//! engine; client halves implement [`Transport`], the interface the client
//! runtime drives. All three variants share one contract: requests correlate
//! by id, notifications arrive out of band, and reverse requests surface
//! through [`Transport::receive_server_request`].

use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
};

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http")]
pub mod sse;

#[cfg(feature = "http")]
pub mod streamable_http;

#[cfg(feature = "stdio")]
pub use stdio::{StdioClientTransport, StdioConfig, StdioServerTransport};

#[cfg(feature = "http")]
pub use sse::{SseClientTransport, SseServerConfig, SseServerTransport};

#[cfg(feature = "http")]
pub use streamable_http::{
    StreamableHttpClientTransport, StreamableHttpServerConfig, StreamableHttpServerTransport,
};

/// Client-side transport contract.
///
/// Methods take `&self`: the runtime keeps one request awaiting its reply
/// while it simultaneously pumps notifications and reverse requests, so
/// transports use interior mutability instead of exclusive borrows.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its reply frame (response or error).
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcMessage>;

    /// Send a notification; nothing comes back.
    async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()>;

    /// Pull the next buffered server notification, without blocking.
    async fn receive_notification(&self) -> McpResult<Option<JsonRpcNotification>>;

    /// Pull the next server-initiated request (sampling), without blocking.
    /// Transports without reverse RPC keep the default.
    async fn receive_server_request(&self) -> McpResult<Option<JsonRpcRequest>> {
        Ok(None)
    }

    /// Answer a server-initiated request.
    async fn send_response(&self, _response: JsonRpcMessage) -> McpResult<()> {
        Err(McpError::transport(
            "transport does not support server-initiated requests",
        ))
    }

    /// Called by the client runtime after `initialize` so HTTP transports
    /// can stamp `Mcp-Protocol-Version` on subsequent requests.
    fn set_protocol_version(&self, _version: &str) {}

    /// Tear down the connection.
    async fn close(&self) -> McpResult<()>;

    fn is_connected(&self) -> bool {
        true
    }

    fn connection_info(&self) -> String {
        "unknown transport".to_string()
    }
}

/// Knobs shared by the client transports.
#[derive(Debug, Clone)]
pub struct ClientTransportConfig {
    /// How long `send_request` waits for the reply frame.
    pub request_timeout: Duration,
    /// Delay before re-opening a dropped listening stream.
    pub reconnect_interval: Duration,
}

impl Default for ClientTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let config = ClientTransportConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
    }
}
