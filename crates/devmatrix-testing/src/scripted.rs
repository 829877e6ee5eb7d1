//! A scripted completion model for recorded-fixture testing.

use async_trait::async_trait;
use devmatrix_core::completion::{Completion, CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Handler = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Canned-response completion model.
///
/// Resolution order per call: queued failures, then the custom handler, then
/// the first matching prompt rule, then the default response. Every prompt
/// is recorded for assertion.
#[derive(Clone)]
pub struct ScriptedCompletionModel {
    inner: Arc<Inner>,
}

struct Inner {
    default_response: Mutex<String>,
    rules: Mutex<Vec<(String, String)>>,
    handler: Mutex<Option<Arc<Handler>>>,
    queued_failures: Mutex<VecDeque<Error>>,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedCompletionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletionModel {
    /// A model that answers every prompt with an empty JSON array.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                default_response: Mutex::new("[]".to_string()),
                rules: Mutex::new(Vec::new()),
                handler: Mutex::new(None),
                queued_failures: Mutex::new(VecDeque::new()),
                prompts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Set the default response.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        *self.inner.default_response.lock() = response.into();
        self
    }

    /// Answer prompts containing `needle` with `response`. Rules are checked
    /// in registration order; the first match wins.
    #[must_use]
    pub fn on_prompt_containing(
        self,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.inner
            .rules
            .lock()
            .push((needle.into(), response.into()));
        self
    }

    /// Compute responses with a custom handler instead of rules.
    #[must_use]
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Some(Arc::new(handler));
        self
    }

    /// Fail the next call with a transient network error.
    pub fn fail_next(&self) {
        self.inner
            .queued_failures
            .lock()
            .push_back(Error::Network("injected failure".into()));
    }

    /// Fail the next call with a specific error.
    pub fn fail_next_with(&self, error: Error) {
        self.inner.queued_failures.lock().push_back(error);
    }

    /// Number of completed calls (including failed ones).
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.prompts.lock().len()
    }

    /// All prompts seen so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.inner.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletionModel {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<Completion> {
        self.inner.prompts.lock().push(prompt.to_string());

        if let Some(error) = self.inner.queued_failures.lock().pop_front() {
            return Err(error);
        }

        let handler = self.inner.handler.lock().clone();
        let text = if let Some(handler) = handler {
            handler(prompt)?
        } else {
            let rules = self.inner.rules.lock();
            rules
                .iter()
                .find(|(needle, _)| prompt.contains(needle))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| self.inner.default_response.lock().clone())
        };

        // Rough byte-per-token accounting so budget tests have something real.
        let usage = TokenUsage {
            prompt_tokens: (prompt.len() / 4) as u64,
            completion_tokens: (text.len() / 4) as u64,
        };
        Ok(Completion { text, usage })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CompletionParams {
        CompletionParams::deterministic("test")
    }

    #[tokio::test]
    async fn default_response_applies() {
        let model = ScriptedCompletionModel::new();
        let out = model.complete("anything", &params()).await.unwrap();
        assert_eq!(out.text, "[]");
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let model = ScriptedCompletionModel::new()
            .on_prompt_containing("alpha", "A")
            .on_prompt_containing("alpha beta", "B");
        let out = model.complete("alpha beta gamma", &params()).await.unwrap();
        assert_eq!(out.text, "A");
    }

    #[tokio::test]
    async fn queued_failures_fire_before_rules() {
        let model = ScriptedCompletionModel::new().with_response("ok");
        model.fail_next();
        assert!(model.complete("p", &params()).await.is_err());
        assert_eq!(model.complete("p", &params()).await.unwrap().text, "ok");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn handler_overrides_rules() {
        let model = ScriptedCompletionModel::new()
            .on_prompt_containing("x", "rule")
            .with_handler(|prompt| Ok(format!("len:{}", prompt.len())));
        let out = model.complete("xx", &params()).await.unwrap();
        assert_eq!(out.text, "len:2");
    }

    #[tokio::test]
    async fn prompts_are_recorded_in_order() {
        let model = ScriptedCompletionModel::new();
        model.complete("first", &params()).await.unwrap();
        model.complete("second", &params()).await.unwrap();
        assert_eq!(model.prompts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn usage_reflects_sizes() {
        let model = ScriptedCompletionModel::new().with_response("12345678");
        let out = model.complete("a".repeat(40).as_str(), &params()).await.unwrap();
        assert_eq!(out.usage.prompt_tokens, 10);
        assert_eq!(out.usage.completion_tokens, 2);
    }
}
