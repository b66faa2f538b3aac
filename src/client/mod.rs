//! Client runtime.

pub mod mcp_client;

pub use mcp_client::{McpClient, SamplingFn, SamplingHandler};
