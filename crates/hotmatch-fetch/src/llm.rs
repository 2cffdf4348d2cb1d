//! Chat-completion clients for OpenAI and Anthropic.
//!
//! Both clients share one request shape, pace calls through a shared `RequestPacer`
//! and hand back the raw text. Callers pull JSON out of it with
//! [`extract_json_object`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{classify_reqwest_error, classify_status, RetryDisposition, RequestPacer};

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Ask the provider for a JSON object when it supports a response format.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1500,
            temperature: 0.3,
            json_mode: true,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response had no text content")]
    EmptyResponse,
}

impl LlmError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Transport(err) => classify_reqwest_error(err),
            Self::Status { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::NonRetryable),
            Self::EmptyResponse => RetryDisposition::NonRetryable,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

fn build_http_client() -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder().timeout(LLM_TIMEOUT).build()?)
}

async fn read_success(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: String = resp.text().await.unwrap_or_default().chars().take(500).collect();
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    pacing: Option<Arc<RequestPacer>>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http_client()?,
            api_key: api_key.into(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            endpoint: OPENAI_CHAT_URL.to_string(),
            pacing: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_pacing(mut self, pacer: Arc<RequestPacer>) -> Self {
        self.pacing = Some(pacer);
        self
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Some(pacer) = &self.pacing {
            pacer.wait().await;
        }
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await?;
        let parsed: OpenAiResponse = read_success(resp).await?.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;
        debug!(chars = text.len(), "openai completion");
        Ok(text)
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    pacing: Option<Arc<RequestPacer>>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http_client()?,
            api_key: api_key.into(),
            model: ANTHROPIC_DEFAULT_MODEL.to_string(),
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
            pacing: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_pacing(mut self, pacer: Arc<RequestPacer>) -> Self {
        self.pacing = Some(pacer);
        self
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Some(pacer) = &self.pacing {
            pacer.wait().await;
        }
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request))
            .send()
            .await?;
        let parsed: AnthropicResponse = read_success(resp).await?.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        debug!(chars = text.len(), "anthropic completion");
        Ok(text)
    }
}

/// Pull the outermost JSON object out of a model reply.
///
/// Markdown code fences and any prose around the object are ignored. Returns
/// `None` when nothing between the first `{` and the last `}` parses.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let unfenced = strip_code_fence(text.trim());
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_object() {
        let value = extract_json_object(r#"{"startups": []}"#).expect("object");
        assert!(value["startups"].as_array().is_some_and(|a| a.is_empty()));
    }

    #[test]
    fn extracts_fenced_object() {
        let reply = "```json\n{\"sector_focus\": [\"AI\"], \"check_size_min\": 0.5}\n```";
        let value = extract_json_object(reply).expect("object");
        assert_eq!(value["sector_focus"][0], "AI");
        assert_eq!(value["check_size_min"], 0.5);
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let reply = "Here is what I found:\n{\"name\": \"Acme\", \"meta\": {\"k\": 1}}\nHope it helps!";
        let value = extract_json_object(reply).expect("object");
        assert_eq!(value["meta"]["k"], 1);
    }

    #[test]
    fn malformed_or_missing_objects_are_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{\"name\": ").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn request_bodies_carry_provider_options() {
        let request = CompletionRequest::new("describe acme")
            .with_system("be terse")
            .with_max_tokens(3000);

        let openai = OpenAiClient::new("test-key").expect("client");
        let body = openai.body(&request);
        assert_eq!(body["model"], OPENAI_DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["response_format"]["type"], "json_object");

        let anthropic = AnthropicClient::new("test-key").expect("client");
        let body = anthropic.body(&request);
        assert_eq!(body["model"], ANTHROPIC_DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 3000);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn status_errors_are_classified() {
        let err = LlmError::Status {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.disposition(), RetryDisposition::Retryable);
        assert_eq!(LlmError::EmptyResponse.disposition(), RetryDisposition::NonRetryable);
    }
}
