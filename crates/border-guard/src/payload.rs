//! Hook payload decoding.
//!
//! The host writes one JSON object to stdin per tool call. Only `tool_name` is
//! required up front; the remaining fields are required once the tool is known
//! to be in the guarded class.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_GUARDED_TOOL: &str = "WebFetch";

/// `tool_response` object fields that may carry the fetched body, in lookup order.
const RESPONSE_BODY_FIELDS: [&str; 4] = ["result", "content", "text", "output"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One guarded tool call, constructed once per invocation and never mutated.
pub struct ToolUseEvent {
    pub tool_name: String,
    pub url: String,
    pub prompt: Option<String>,
    pub content: String,
    pub tool_use_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPayload {
    Guarded(ToolUseEvent),
    PassThrough { tool_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadParseError {
    #[error("hook payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("hook payload must be a JSON object")]
    NotAnObject,
    #[error("hook payload is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("hook payload field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Case-insensitive set of tool names whose results pass through the guard.
pub struct GuardedTools {
    names: Vec<String>,
}

impl GuardedTools {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_ascii_lowercase();
            if !name.is_empty() && !normalized.contains(&name) {
                normalized.push(name);
            }
        }
        Self { names: normalized }
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        let tool_name = tool_name.trim().to_ascii_lowercase();
        self.names.iter().any(|name| *name == tool_name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for GuardedTools {
    fn default() -> Self {
        Self::new([DEFAULT_GUARDED_TOOL])
    }
}

/// Decodes the raw stdin payload.
pub fn parse_hook_payload(
    raw: &[u8],
    guarded: &GuardedTools,
) -> Result<ParsedPayload, PayloadParseError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|error| PayloadParseError::InvalidJson(error.to_string()))?;
    let object = value.as_object().ok_or(PayloadParseError::NotAnObject)?;

    let tool_name = required_str(object, "tool_name")?;
    if tool_name.trim().is_empty() {
        return Err(PayloadParseError::MissingField("tool_name"));
    }
    if !guarded.contains(tool_name) {
        return Ok(ParsedPayload::PassThrough {
            tool_name: tool_name.to_string(),
        });
    }

    let tool_input = match object.get("tool_input") {
        None | Some(Value::Null) => return Err(PayloadParseError::MissingField("tool_input")),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(PayloadParseError::WrongType {
                field: "tool_input",
                expected: "an object",
            })
        }
    };
    let url = match tool_input.get("url") {
        None | Some(Value::Null) => return Err(PayloadParseError::MissingField("tool_input.url")),
        Some(Value::String(url)) => url.clone(),
        Some(_) => {
            return Err(PayloadParseError::WrongType {
                field: "tool_input.url",
                expected: "a string",
            })
        }
    };
    let prompt = match tool_input.get("prompt") {
        None | Some(Value::Null) => None,
        Some(Value::String(prompt)) => Some(prompt.clone()),
        Some(_) => {
            return Err(PayloadParseError::WrongType {
                field: "tool_input.prompt",
                expected: "a string",
            })
        }
    };

    let content = extract_response_body(object.get("tool_response"))?;
    let tool_use_id = required_str(object, "tool_use_id")?.to_string();
    let session_id = required_str(object, "session_id")?.to_string();

    Ok(ParsedPayload::Guarded(ToolUseEvent {
        tool_name: tool_name.to_string(),
        url,
        prompt,
        content,
        tool_use_id,
        session_id,
    }))
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, PayloadParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PayloadParseError::MissingField(field)),
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(_) => Err(PayloadParseError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn extract_response_body(response: Option<&Value>) -> Result<String, PayloadParseError> {
    match response {
        None | Some(Value::Null) => Err(PayloadParseError::MissingField("tool_response")),
        Some(Value::String(body)) => Ok(body.clone()),
        Some(Value::Object(map)) => RESPONSE_BODY_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(PayloadParseError::WrongType {
                field: "tool_response",
                expected: "a string or an object with a string result/content/text/output field",
            }),
        Some(_) => Err(PayloadParseError::WrongType {
            field: "tool_response",
            expected: "a string or an object",
        }),
    }
}
