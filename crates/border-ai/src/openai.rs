use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use border_core::current_unix_timestamp_ms;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{BorderAiError, ChatRequest, ChatResponse, ChatUsage, LlmClient, Message};

pub const REQUEST_ID_HEADER: &str = "x-border-request-id";

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn new_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("border-{}-{count}", current_unix_timestamp_ms())
}

#[derive(Debug, Clone)]
/// Connection settings for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// Single-attempt chat-completions client. Callers own any retry policy.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, BorderAiError> {
        if config.api_key.trim().is_empty() {
            return Err(BorderAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        let mut bearer = HeaderValue::from_str(&bearer).map_err(|e| {
            BorderAiError::InvalidResponse(format!("invalid API key header: {e}"))
        })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, BorderAiError> {
        let body = build_chat_request_body(&request);
        let response = self
            .client
            .post(self.chat_completions_url())
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(BorderAiError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }
        parse_chat_response(&raw)
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if request.json_mode {
        body["response_format"] = json!({
            "type": "json_object",
        });
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, BorderAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice =
        parsed.choices.into_iter().next().ok_or_else(|| {
            BorderAiError::InvalidResponse("response contained no choices".to_string())
        })?;

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant_text(flatten_openai_content(choice.message.content)),
        finish_reason: choice.finish_reason,
        usage,
    })
}

fn flatten_openai_content(content: Option<Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}
