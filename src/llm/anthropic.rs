//! Anthropic Claude API 客户端实现

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage};
use crate::config::LlmConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude API 客户端
pub struct AnthropicClient {
    model: String,
    api_key: Secret<String>,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": request.messages,
        })
    }

    fn parse_response(api_response: AnthropicResponse) -> Result<CompletionResponse, LlmError> {
        let content = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse("completion contained no text".to_string()));
        }

        Ok(CompletionResponse {
            content,
            stop_reason: StopReason::from_anthropic(api_response.stop_reason.as_deref().unwrap_or("end_turn")),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, messages = request.messages.len(), "complete: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "complete: API error");
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let completion = Self::parse_response(api_response)?;
        debug!(
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            stop_reason = ?completion.stop_reason,
            "complete: success"
        );
        Ok(completion)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
