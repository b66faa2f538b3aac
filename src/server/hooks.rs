//! Lifecycle hooks: read-only observers of session and dispatch events.
//!
//! Hooks never influence dispatch; they exist for metrics, audit logging,
//! and tests that want to watch the engine from outside.

use std::sync::Arc;

use crate::core::error::McpError;

type SessionObserver = Arc<dyn Fn(&str) + Send + Sync>;
type MethodObserver = Arc<dyn Fn(&str, &str) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&str, &McpError) + Send + Sync>;

/// Observer set attached to a server at construction time.
#[derive(Default, Clone)]
pub struct Hooks {
    on_register_session: Vec<SessionObserver>,
    on_unregister_session: Vec<SessionObserver>,
    before_method: Vec<MethodObserver>,
    after_method: Vec<MethodObserver>,
    on_error: Vec<ErrorObserver>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe session registration; receives the session id.
    pub fn add_on_register_session(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_register_session.push(Arc::new(f));
        self
    }

    /// Observe session teardown; receives the session id.
    pub fn add_on_unregister_session(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_unregister_session.push(Arc::new(f));
        self
    }

    /// Observe dispatch before the handler runs; receives (session id, method).
    pub fn add_before_method(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.before_method.push(Arc::new(f));
        self
    }

    /// Observe dispatch after the handler returned; receives (session id, method).
    pub fn add_after_method(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.after_method.push(Arc::new(f));
        self
    }

    /// Observe dispatch failures; receives (method, error).
    pub fn add_on_error(mut self, f: impl Fn(&str, &McpError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    pub(crate) fn fire_register_session(&self, id: &str) {
        for hook in &self.on_register_session {
            hook(id);
        }
    }

    pub(crate) fn fire_unregister_session(&self, id: &str) {
        for hook in &self.on_unregister_session {
            hook(id);
        }
    }

    pub(crate) fn fire_before_method(&self, session_id: &str, method: &str) {
        for hook in &self.before_method {
            hook(session_id, method);
        }
    }

    pub(crate) fn fire_after_method(&self, session_id: &str, method: &str) {
        for hook in &self.after_method {
            hook(session_id, method);
        }
    }

    pub(crate) fn fire_error(&self, method: &str, error: &McpError) {
        for hook in &self.on_error {
            hook(method, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observers_fire_in_registration_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = counter.clone();
        let b = counter.clone();
        let hooks = Hooks::new()
            .add_before_method(move |_, _| {
                a.fetch_add(1, Ordering::SeqCst);
            })
            .add_before_method(move |_, _| {
                b.fetch_add(10, Ordering::SeqCst);
            });

        hooks.fire_before_method("s", "ping");
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}
