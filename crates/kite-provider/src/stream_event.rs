//! Line-level classification of the Claude CLI `stream-json` output.
//!
//! Each stdout line is one JSON object tagged by `type`. Lines that are not
//! JSON objects, or carry a tag outside the closed event set, are rejected by
//! [`parse_stream_line`]; [`classify_stream_line`] keeps them as
//! [`StreamEvent::Unparsed`] so no output is lost.

use serde_json::{Map, Value};
use thiserror::Error;

const RESULT_TEXT_FIELDS: [&str; 5] = ["result", "response", "content", "text", "message"];
const SESSION_ID_FIELDS: [&str; 4] = ["session_id", "sessionId", "conversation_id", "conversationId"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Thinking {
        thinking: String,
    },
    /// Block types this client does not interpret.
    Other {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    System {
        subtype: Option<String>,
        session_id: Option<String>,
    },
    AssistantMessage {
        content_blocks: Vec<StreamContentBlock>,
        stop_reason: Option<String>,
        usage: Option<StreamUsage>,
    },
    UserMessage {
        content_blocks: Vec<StreamContentBlock>,
    },
    Result {
        text: String,
        session_id: Option<String>,
        usage: Option<StreamUsage>,
        cost_usd: Option<f64>,
        is_error: bool,
    },
    Error {
        payload: Value,
    },
    Unparsed {
        raw_line: String,
    },
}

impl StreamEvent {
    /// Last non-blank `Text` block of an assistant message. `None` for other
    /// events or when the message carries no text.
    pub fn assistant_text(&self) -> Option<String> {
        let StreamEvent::AssistantMessage { content_blocks, .. } = self else {
            return None;
        };
        content_blocks.iter().rev().find_map(|block| match block {
            StreamContentBlock::Text { text } if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        })
    }

    /// Human-readable message of an `Error` event.
    pub fn error_message(&self) -> Option<String> {
        let StreamEvent::Error { payload } = self else {
            return None;
        };
        Some(describe_error_payload(payload))
    }
}

/// Protocol anomalies: the line is kept, but not as a typed event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamParseError {
    #[error("line is not valid json: {0}")]
    InvalidJson(String),
    #[error("line is json but not an object")]
    NotAnObject,
    #[error("event has no string 'type' tag")]
    MissingType,
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),
}

/// Parses one stdout line. Blank lines yield `Ok(None)`.
pub fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>, StreamParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str::<Value>(trimmed)
        .map_err(|error| StreamParseError::InvalidJson(error.to_string()))?;
    let Value::Object(map) = value else {
        return Err(StreamParseError::NotAnObject);
    };
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(StreamParseError::MissingType)?;

    let event = match kind {
        "system" => StreamEvent::System {
            subtype: string_field(&map, "subtype"),
            session_id: first_string(&map, &SESSION_ID_FIELDS),
        },
        "assistant" => {
            let message = message_object(&map);
            StreamEvent::AssistantMessage {
                content_blocks: content_blocks(message.get("content")),
                stop_reason: string_field(message, "stop_reason"),
                usage: message.get("usage").and_then(parse_usage),
            }
        }
        "user" => StreamEvent::UserMessage {
            content_blocks: content_blocks(message_object(&map).get("content")),
        },
        "result" => StreamEvent::Result {
            text: first_string(&map, &RESULT_TEXT_FIELDS).unwrap_or_default(),
            session_id: first_string(&map, &SESSION_ID_FIELDS),
            usage: map.get("usage").and_then(parse_usage),
            cost_usd: map
                .get("total_cost_usd")
                .or_else(|| map.get("cost_usd"))
                .and_then(Value::as_f64),
            is_error: map.get("is_error").and_then(Value::as_bool).unwrap_or(false)
                || string_field(&map, "subtype").is_some_and(|subtype| subtype.starts_with("error")),
        },
        "error" => StreamEvent::Error {
            payload: map
                .get("error")
                .cloned()
                .unwrap_or_else(|| Value::Object(map.clone())),
        },
        other => return Err(StreamParseError::UnknownEventType(other.to_string())),
    };
    Ok(Some(event))
}

/// Like [`parse_stream_line`], but demotes every anomaly to
/// [`StreamEvent::Unparsed`] after logging it.
pub fn classify_stream_line(line: &str) -> Option<StreamEvent> {
    match parse_stream_line(line) {
        Ok(event) => event,
        Err(error) => {
            tracing::debug!(
                error = %error,
                line_chars = line.chars().count(),
                "unparsed stream line"
            );
            Some(StreamEvent::Unparsed {
                raw_line: line.trim_end_matches(&['\r', '\n'][..]).to_string(),
            })
        }
    }
}

fn message_object(map: &Map<String, Value>) -> &Map<String, Value> {
    map.get("message").and_then(Value::as_object).unwrap_or(map)
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn parse_usage(value: &Value) -> Option<StreamUsage> {
    let map = value.as_object()?;
    let count = |key: &str| map.get(key).and_then(Value::as_u64).unwrap_or(0);
    Some(StreamUsage {
        input_tokens: count("input_tokens"),
        output_tokens: count("output_tokens"),
    })
}

fn content_blocks(content: Option<&Value>) -> Vec<StreamContentBlock> {
    match content {
        Some(Value::String(text)) => vec![StreamContentBlock::Text { text: text.clone() }],
        Some(Value::Array(blocks)) => blocks.iter().map(content_block).collect(),
        _ => Vec::new(),
    }
}

fn content_block(value: &Value) -> StreamContentBlock {
    let Some(map) = value.as_object() else {
        return match value.as_str() {
            Some(text) => StreamContentBlock::Text {
                text: text.to_string(),
            },
            None => StreamContentBlock::Other {
                kind: "unknown".to_string(),
            },
        };
    };
    let kind = map.get("type").and_then(Value::as_str).unwrap_or("unknown");
    match kind {
        "text" => StreamContentBlock::Text {
            text: string_field(map, "text").unwrap_or_default(),
        },
        "tool_use" => StreamContentBlock::ToolUse {
            id: string_field(map, "id").unwrap_or_default(),
            name: string_field(map, "name").unwrap_or_default(),
            input: map.get("input").cloned().unwrap_or(Value::Null),
        },
        "tool_result" => StreamContentBlock::ToolResult {
            tool_use_id: string_field(map, "tool_use_id").unwrap_or_default(),
            content: tool_result_text(map.get("content")),
            is_error: map.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        },
        "thinking" => StreamContentBlock::Thinking {
            thinking: string_field(map, "thinking").unwrap_or_default(),
        },
        other => StreamContentBlock::Other {
            kind: other.to_string(),
        },
    }
}

fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn describe_error_payload(payload: &Value) -> String {
    match payload {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| map.get("error").map(describe_error_payload))
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}
