//! OpenAI-compatible provider — works with OpenAI, Ollama, Groq, etc.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rahl_core::error::{RahlError, Result};
use rahl_core::message::{ChatMessage, LlmResponse, TokenUsage};
use rahl_core::provider::{ChatRequest, LlmProvider, ProviderConfig};

/// OpenAI-compatible provider.
///
/// Works with any API that follows the OpenAI chat completions format:
/// - OpenAI (api.openai.com)
/// - Ollama (localhost:11434)
/// - OpenRouter (openrouter.ai)
/// - Groq, Gemini's OpenAI endpoint, etc.
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
    api_url: String,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| default_api_base(&config.provider).to_string());

        let api_url = format!("{}/chat/completions", api_base.trim_end_matches('/'));

        Self {
            client: Client::new(),
            config,
            api_url,
        }
    }

    /// Create a provider for OpenAI.
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new(ProviderConfig {
            provider: "openai".to_string(),
            model: model.to_string(),
            api_key: Some(api_key.to_string()),
            ..Default::default()
        })
    }

    /// Create a provider for Ollama (local).
    pub fn ollama(model: &str) -> Self {
        Self::new(ProviderConfig {
            provider: "ollama".to_string(),
            model: model.to_string(),
            api_key: Some("ollama".to_string()),
            ..Default::default()
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// Base URL for a known provider name; unknown names use OpenAI's.
fn default_api_base(provider: &str) -> &'static str {
    match provider {
        "ollama" => "http://localhost:11434/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        _ => "https://api.openai.com/v1",
    }
}

/// Internal request body.
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// Internal response body.
#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        let model = request
            .model
            .unwrap_or_else(|| self.config.model.clone());

        info!("Calling {} model: {}", self.config.provider, model);

        let body = ApiRequest {
            model: &model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let api_key = self.config.api_key.as_deref().unwrap_or("");

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let body_text = resp.text().await?;

        debug!("API response status: {}, body length: {}", status, body_text.len());

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiError>(&body_text) {
                Ok(err) => err.error.message,
                Err(_) => truncate(&body_text, 200).to_string(),
            };
            return Err(RahlError::Provider(format!(
                "{} API error ({}): {}",
                self.config.provider, status, detail
            )));
        }

        let api_resp: ApiResponse = serde_json::from_str(&body_text).map_err(|e| {
            RahlError::Provider(format!(
                "Failed to parse response: {} — body: {}",
                e,
                truncate(&body_text, 200)
            ))
        })?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RahlError::Provider("No choices in response".to_string()))?;

        let usage = api_resp
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content,
            // The API may remap the requested model; report what actually ran.
            model: if api_resp.model.is_empty() { model } else { api_resp.model },
            usage,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
