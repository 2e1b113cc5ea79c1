//! Anthropic messages-API provider.
//!
//! The provider with a signed BAA and zero data retention in the stock
//! catalog; the policy baseline routes protected data here.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use warden_core::types::ProviderId;

use super::{
    secrets::{ApiCredential, CredentialSource},
    GenerationRequest, GenerationResponse, ProviderError, TextProvider,
};

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Pricing per 1K tokens: (input, output).
fn pricing(model: &str) -> (f64, f64) {
    match model {
        "claude-3-opus-20240229" => (0.015, 0.075),
        "claude-3-5-sonnet-20241022" => (0.003, 0.015),
        "claude-3-haiku-20240307" => (0.00025, 0.00125),
        // Price unknown models at the most expensive tier.
        _ => (0.015, 0.075),
    }
}

fn estimate_cost(tokens_input: u32, tokens_output: u32, model: &str) -> f64 {
    let (input_rate, output_rate) = pricing(model);
    (f64::from(tokens_input) / 1000.0) * input_rate
        + (f64::from(tokens_output) / 1000.0) * output_rate
}

/// Anthropic provider over the messages API.
pub struct AnthropicProvider {
    id: ProviderId,
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            id: ProviderId::from("anthropic"),
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        Ok(Self {
            id: ProviderId::from("anthropic"),
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create from JSON configuration, with `api_key` falling back to the
    /// environment variable and `base_url` optional.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;
        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string();
        Ok(Self {
            id: ProviderId::from("anthropic"),
            credential,
            base_url,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn client(&self) -> &reqwest::Client {
        static CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();
        CLIENT.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("HTTP client construction cannot fail with static config")
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl TextProvider for AnthropicProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let started = Instant::now();
        let response = self
            .client()
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(Duration::from_secs(60))
                } else {
                    ProviderError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth);
        }
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let content = parsed
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerationResponse {
            content,
            cost_usd: estimate_cost(
                parsed.usage.input_tokens,
                parsed.usage.output_tokens,
                &parsed.model,
            ),
            model: parsed.model,
            tokens_input: parsed.usage.input_tokens,
            tokens_output: parsed.usage.output_tokens,
            latency_ms,
        })
    }

    async fn health_check(&self) -> bool {
        // A credential is the only local precondition; reachability is
        // established by the first generate call.
        !self.credential.expose().is_empty()
    }

    fn id(&self) -> &ProviderId {
        &self.id
    }
}
