//! Text-generation provider abstractions.
//!
//! This module defines the contract the governance coordinator expects from
//! a provider: given a model and a generation request, return the generated
//! text with token counts, wall-clock latency, and computed cost — or fail
//! with a provider-error condition. The coordinator treats all failure
//! variants uniformly for audit purposes.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling. See
//! [`ApiCredential`] for the patterns.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use warden_core::types::ProviderId;

mod registry;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use registry::ProviderRegistry;
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;

#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

/// Errors from text-generation providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("authentication failed")]
    Auth,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// A generation request as handed to a provider. The model is already
/// resolved by policy; providers must not substitute another one.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.1,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// A completed generation with its accounting.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,

    /// Model that actually served the request.
    pub model: String,

    pub tokens_input: u32,
    pub tokens_output: u32,

    /// Wall-clock latency of the provider call.
    pub latency_ms: f64,

    /// Estimated cost in USD from the provider's pricing table.
    pub cost_usd: f64,
}

impl GenerationResponse {
    pub fn tokens_total(&self) -> u32 {
        self.tokens_input + self.tokens_output
    }
}

/// Provider abstraction allows swapping generation backends.
///
/// Implementations perform the only network I/O in the request lifecycle;
/// the governance core never calls them directly — only the coordinator
/// does, before it enters the audit critical section.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Execute one generation call.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Whether the provider is reachable and configured.
    async fn health_check(&self) -> bool;

    /// Identifier this provider registers under.
    fn id(&self) -> &ProviderId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_defaults() {
        let request = GenerationRequest::new("hello", "claude-3-opus-20240229");
        assert_eq!(request.max_tokens, 4096);
        assert!(request.system_prompt.is_none());

        let request = request.with_system_prompt("be brief");
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn test_tokens_total() {
        let response = GenerationResponse {
            content: "hi".to_string(),
            model: "m".to_string(),
            tokens_input: 100,
            tokens_output: 50,
            latency_ms: 10.0,
            cost_usd: 0.001,
        };
        assert_eq!(response.tokens_total(), 150);
    }
}
