//! Server runtime: the protocol engine, session handles, and hooks.

pub mod context;
pub mod engine;
pub mod hooks;
pub mod session;

pub use context::{RequestContext, ToolContext};
pub use engine::{McpServer, ServerOptions};
pub use hooks::Hooks;
pub use session::{
    ClientSession, SamplingBridge, SessionLogLevel, SessionRegistry, SessionTools,
};
