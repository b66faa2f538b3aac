//! MCP method name constants.
//!
//! Every method and notification name recognized by the server dispatch
//! table and emitted by the client runtime lives here, so transports and
//! tests never spell wire strings inline.

// Lifecycle
pub const INITIALIZE: &str = "initialize";
pub const INITIALIZED: &str = "notifications/initialized";
pub const PING: &str = "ping";

// Tools
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

// Resources
pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";

// Prompts
pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

// Sampling (server -> client)
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

// Completion
pub const COMPLETION_COMPLETE: &str = "completion/complete";

// Logging
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
pub const LOGGING_MESSAGE: &str = "notifications/message";

// Progress
pub const PROGRESS: &str = "notifications/progress";

/// Methods the server answers. Anything else gets `-32601 Method not found`.
pub const SERVER_REQUEST_METHODS: &[&str] = &[
    INITIALIZE,
    PING,
    TOOLS_LIST,
    TOOLS_CALL,
    RESOURCES_LIST,
    RESOURCES_TEMPLATES_LIST,
    RESOURCES_READ,
    RESOURCES_SUBSCRIBE,
    RESOURCES_UNSUBSCRIBE,
    PROMPTS_LIST,
    PROMPTS_GET,
    LOGGING_SET_LEVEL,
    COMPLETION_COMPLETE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_methods_use_notifications_prefix() {
        for method in [
            INITIALIZED,
            TOOLS_LIST_CHANGED,
            RESOURCES_UPDATED,
            RESOURCES_LIST_CHANGED,
            PROMPTS_LIST_CHANGED,
            LOGGING_MESSAGE,
            PROGRESS,
        ] {
            assert!(method.starts_with("notifications/"), "{method}");
        }
    }

    #[test]
    fn dispatch_table_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for method in SERVER_REQUEST_METHODS {
            assert!(seen.insert(*method), "duplicate method {method}");
        }
    }
}
