//! Core abstractions: errors, argument access, and the handler traits for
//! tools, resources, prompts, and completion.

pub mod arguments;
pub mod completion;
pub mod error;
pub mod prompt;
pub mod resource;
pub mod tool;

pub use arguments::ToolArguments;
pub use error::{McpError, McpResult};
pub use prompt::{PromptFn, PromptHandler, RegisteredPrompt};
pub use resource::{
    RegisteredResource, RegisteredResourceTemplate, ResourceFn, ResourceHandler,
};
pub use tool::{RegisteredTool, ToolBuilder, ToolFn, ToolHandler};
