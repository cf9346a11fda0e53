//! Completion client for the suggestion step.
//!
//! [`CompletionClient`] is the seam the pipeline calls. [`OpenAiClient`] talks to the chat
//! completions API and [`interpret_response`] turns its reply into plain text or an
//! upstream error.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::{config::Config, errors::PredictorError, models::SearchRequest};

pub const SYSTEM_PROMPT: &str = "You are an expert domain investor and market analyst. Your task is to suggest potentially valuable domain names based on the following criteria.";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1000;

/// Anything that turns a system + user prompt into completion text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PredictorError>;
}

/// Interpolates the search parameters into the user prompt.
pub fn build_user_prompt(request: &SearchRequest) -> String {
    let mut prompt = format!(
        "I'm looking for domain name suggestions in the {} niche that could increase in value within {} months.",
        request.niche, request.timeframe_months
    );

    if let Some(budget) = request.budget.filter(|b| *b > 0.0) {
        prompt.push_str(&format!(" My budget is ${}.", budget));
    }

    if let Some(keywords) = request.keywords.as_deref().filter(|k| !k.is_empty()) {
        prompt.push_str(&format!(" Keywords to consider: {}.", keywords));
    }

    prompt.push_str(" Please suggest 10 domain names that are likely available and have good investment potential. For each domain, provide a brief explanation of why it might gain value.");
    prompt
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self, PredictorError> {
        let client = reqwest::Client::builder()
            .timeout(config.llm_timeout())
            .build()?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            api_url: config.openai_api_url.clone(),
            model: config.openai_model.clone(),
            timeout: config.llm_timeout(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PredictorError> {
        if self.api_key.trim().is_empty() {
            error!("OpenAI API key is missing");
            return Err(PredictorError::Upstream("OpenAI API key is not configured".to_string()));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| PredictorError::Upstream("completion request timed out".to_string()))?
        .map_err(|e| PredictorError::Upstream(format!("completion transport error: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PredictorError::Upstream(format!("completion body unreadable: {}", e)))?;

        debug!("Completion endpoint answered {} ({} bytes)", status, text.len());
        interpret_response(status, &text)
    }
}

/// Validates a completion response and returns `choices[0].message.content`.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<String, PredictorError> {
    if body.trim().is_empty() {
        return Err(PredictorError::Upstream(format!("empty completion body (status {})", status)));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PredictorError::Upstream(format!("completion body is not JSON: {}", e)))?;

    if status != StatusCode::OK {
        let message = serde_json::from_value::<ApiErrorBody>(value)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(PredictorError::Upstream(format!("completion status {}: {}", status, message)));
    }

    let parsed: ChatResponse = serde_json::from_value(value)
        .map_err(|e| PredictorError::Upstream(format!("unexpected completion shape: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| PredictorError::Upstream("completion has no choices[0].message.content".to_string()))
}
