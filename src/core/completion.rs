//! Argument autocompletion for prompts and resource templates.

use async_trait::async_trait;

use crate::core::error::McpResult;
use crate::protocol::messages::{Completion, CompletionArgument, CompletionReference};

/// Implemented by completion providers; registered per reference kind
/// (`ref/prompt`, `ref/resource`).
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn complete(
        &self,
        reference: &CompletionReference,
        argument: &CompletionArgument,
    ) -> McpResult<Completion>;
}

/// Completes from a fixed candidate list by prefix match. Covers the common
/// case of enumerable prompt arguments without a custom handler.
pub struct StaticCompletionHandler {
    candidates: Vec<String>,
}

impl StaticCompletionHandler {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CompletionHandler for StaticCompletionHandler {
    async fn complete(
        &self,
        _reference: &CompletionReference,
        argument: &CompletionArgument,
    ) -> McpResult<Completion> {
        let values: Vec<String> = self
            .candidates
            .iter()
            .filter(|c| c.starts_with(&argument.value))
            .cloned()
            .collect();
        let total = values.len() as u64;
        Ok(Completion {
            values,
            total: Some(total),
            has_more: Some(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_handler_filters_by_prefix() {
        let handler = StaticCompletionHandler::new(["alpha", "beta", "alcove"]);
        let completion = handler
            .complete(
                &CompletionReference::Prompt {
                    name: "greet".to_string(),
                },
                &CompletionArgument {
                    name: "word".to_string(),
                    value: "al".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(completion.values, vec!["alpha", "alcove"]);
    }
}
