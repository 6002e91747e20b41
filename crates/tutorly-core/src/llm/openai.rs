use crate::constants::{endpoints, models};
use crate::error::TutorError;
use crate::llm::traits::*;
use serde::{Deserialize, Serialize};

/// Client for any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGateway {
    /// `api_key` may be absent; completions then fail with a
    /// configuration error without touching the network.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: models::DEFAULT_CHAT_MODEL.to_string(),
            base_url: endpoints::CHAT_BASE_URL.to_string(),
            temperature: models::TEMPERATURE,
            max_tokens: models::MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

/// Prefer the provider's own `error.message`; fall back to the raw body.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => format!("Chat provider returned {}", status),
        Err(_) => format!("Chat provider returned {}: {}", status, body.trim()),
    }
}

#[async_trait::async_trait]
impl ChatGateway for OpenAiGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TutorError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            TutorError::Configuration("Chat provider API key is not configured".into())
        })?;

        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            endpoints::CHAT_COMPLETIONS_PATH
        );
        let request_body = OpenAIRequest {
            model: &self.model,
            messages: request.to_messages(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            history = request.history.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%status, "Chat provider rejected completion");
            return Err(TutorError::Upstream(upstream_message(status, &response_text)));
        }

        let api_response: OpenAIResponse = serde_json::from_str(&response_text)
            .map_err(|e| TutorError::upstream(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TutorError::upstream("No response from provider"))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}
