//! Folds a stream of [`StreamEvent`]s into one final answer.

use crate::stream_event::{StreamEvent, StreamUsage};

/// Reduced result of a streaming run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    pub text: String,
    pub session_id: Option<String>,
    pub usage: StreamUsage,
    pub cost_usd: Option<f64>,
    /// Set when the text came from an error-flagged result or an error event.
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct ResultRecord {
    text: String,
    session_id: Option<String>,
    usage: Option<StreamUsage>,
    cost_usd: Option<f64>,
    is_error: bool,
}

/// Incremental reducer. The last `Result` event wins; without one the last
/// assistant text, then the last error event, then the raw unparsed lines
/// provide the text.
#[derive(Debug, Default)]
pub struct StreamReducer {
    last_result: Option<ResultRecord>,
    last_assistant_text: Option<String>,
    last_error: Option<String>,
    unparsed_lines: Vec<String>,
    events_seen: usize,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    pub fn push(&mut self, event: StreamEvent) {
        self.events_seen += 1;
        if let Some(text) = event.assistant_text() {
            self.last_assistant_text = Some(text);
            return;
        }
        if let Some(message) = event.error_message() {
            self.last_error = Some(message);
            return;
        }
        match event {
            StreamEvent::Result {
                text,
                session_id,
                usage,
                cost_usd,
                is_error,
            } => {
                self.last_result = Some(ResultRecord {
                    text,
                    session_id,
                    usage,
                    cost_usd,
                    is_error,
                });
            }
            StreamEvent::Unparsed { raw_line } => {
                let line = raw_line.trim();
                if !line.is_empty() {
                    self.unparsed_lines.push(line.to_string());
                }
            }
            StreamEvent::System { .. }
            | StreamEvent::AssistantMessage { .. }
            | StreamEvent::UserMessage { .. }
            | StreamEvent::Error { .. } => {}
        }
    }

    pub fn finish(self) -> StreamOutcome {
        if let Some(result) = self.last_result {
            let (text, is_error) = if result.is_error {
                let detail = if result.text.trim().is_empty() {
                    "claude cli reported an error"
                } else {
                    result.text.as_str()
                };
                (format!("Error: {detail}"), true)
            } else {
                (result.text, false)
            };
            return StreamOutcome {
                text,
                session_id: result.session_id,
                usage: result.usage.unwrap_or_default(),
                cost_usd: result.cost_usd,
                is_error,
            };
        }

        if let Some(text) = self.last_assistant_text {
            return StreamOutcome {
                text,
                ..StreamOutcome::default()
            };
        }
        if let Some(message) = self.last_error {
            return StreamOutcome {
                text: format!("Error: {message}"),
                is_error: true,
                ..StreamOutcome::default()
            };
        }
        StreamOutcome {
            text: self.unparsed_lines.join("\n"),
            ..StreamOutcome::default()
        }
    }
}

pub fn reduce_stream_events<I>(events: I) -> StreamOutcome
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut reducer = StreamReducer::new();
    for event in events {
        reducer.push(event);
    }
    reducer.finish()
}
