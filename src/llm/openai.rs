use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{RelayError, Result};

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// The model is chosen per request so the same client can serve both the
/// regular and the downgrade model.
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    base_url: String,
    max_tokens: usize,
    temperature: f32,
}

// -- Request/response types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiEngine {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RelayError::Config(
                "API key required: set OPENAI_API_KEY env var or llm.api_key in config".into(),
            ));
        }

        let timeout = if config.timeout_secs > 0 {
            Duration::from_secs(config.timeout_secs)
        } else {
            Duration::from_secs(300)
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            base_url = %base_url,
            max_tokens = config.max_tokens,
            temperature = config.temperature,
            timeout_secs = config.timeout_secs,
            "OpenAI engine initialized"
        );

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Ask `model` a single user question and return the trimmed answer.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: (self.max_tokens > 0).then_some(self.max_tokens),
            temperature: self.temperature,
        };

        debug!(model, prompt_len = prompt.len(), "invoking chat completions API");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Llm(format!("completion request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let error_msg = serde_json::from_str::<ErrorResponse>(&error_text)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(error_text);

            warn!(status = %status, error = %error_msg, "chat completions API error");
            return Err(RelayError::Llm(format!("API returned {status}: {error_msg}")));
        }

        let chat_resp: ChatResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Llm(format!("failed to parse completion response: {e}")))?;

        if let Some(usage) = &chat_resp.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        let answer = chat_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        if answer.is_empty() {
            return Err(RelayError::Llm("completion returned an empty answer".into()));
        }

        info!(model, answer_len = answer.len(), "completion received");
        Ok(answer)
    }
}
