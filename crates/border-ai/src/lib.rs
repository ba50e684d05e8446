//! Inference client surface used by the border guard classifier.
//!
//! Exposes provider-neutral chat types, the `LlmClient` trait, and an
//! OpenAI-compatible chat-completions client (xAI, OpenAI, OpenRouter).
mod openai;
mod types;

pub use openai::{new_request_id, OpenAiCompatClient, OpenAiCompatConfig, REQUEST_ID_HEADER};
pub use types::{
    BorderAiError, ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole,
};
