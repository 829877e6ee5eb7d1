//! The LLM completion interface consumed by the pipeline.
//!
//! The core is provider-agnostic: it sees a single `complete(prompt, params)`
//! operation. Strategy and implementation roles in the inference engine are
//! two named invocations of this one capability, not two subtypes.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Seed used whenever a caller asks for deterministic decoding.
pub const DETERMINISTIC_SEED: u64 = 42;

/// Decoding parameters for a single completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Provider-side model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output token cap
    pub max_tokens: u32,
    /// Decoding seed, where the provider supports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            seed: None,
            stop: None,
        }
    }
}

impl CompletionParams {
    /// Deterministic decoding: temperature 0 and a fixed seed.
    ///
    /// Used by every pipeline call so repeated runs agree modulo provider
    /// nondeterminism.
    #[must_use]
    pub fn deterministic(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: 4096,
            seed: Some(DETERMINISTIC_SEED),
            stop: None,
        }
    }

    /// Set the output token cap
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Token accounting for a single completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u64,
    /// Tokens produced by the completion
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Accumulate another call's usage into this one.
    pub fn absorb(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub text: String,
    /// Token accounting, zero when the provider reports none
    #[serde(default)]
    pub usage: TokenUsage,
}

impl Completion {
    /// A completion with no usage accounting.
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
        }
    }
}

/// A provider capable of text completion.
///
/// Failure modes map onto the core error taxonomy: network and rate-limit
/// failures are transient (retried with backoff), content-policy refusals
/// and parse failures are terminal for the call after retries.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete `prompt` under the given decoding parameters.
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion>;

    /// Provider-side model family name, for logs and reports.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_params_pin_temperature_and_seed() {
        let params = CompletionParams::deterministic("planner-v2");
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.seed, Some(DETERMINISTIC_SEED));
        assert_eq!(params.model, "planner-v2");
    }

    #[test]
    fn usage_absorb_accumulates() {
        let mut total = TokenUsage::default();
        total.absorb(TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 80,
        });
        total.absorb(TokenUsage {
            prompt_tokens: 30,
            completion_tokens: 10,
        });
        assert_eq!(total.total(), 240);
    }

    #[test]
    fn params_serialize_without_empty_optionals() {
        let params = CompletionParams::deterministic("m");
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["seed"], 42);
    }
}
