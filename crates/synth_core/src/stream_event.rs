use serde_json::Value;

pub const DEFAULT_STREAM_ERROR: &str = "Stream error";

/// Payload of an event without a dedicated variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// `data:` content that was not valid JSON.
    Raw(String),
}

/// One decoded Server-Sent Event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Citation(Value),
    Image(Value),
    Stage(Value),
    Section(Value),
    Progress(Value),
    /// Final payload of a session, e.g. `{"citations": [...]}`.
    Done(Value),
    /// Server-sent `error` event.
    Error { message: String },
    /// Any other event name, or a payload that failed to parse.
    Data { event: String, payload: Payload },
}

impl StreamEvent {
    /// Builds an event from the current event name and a non-empty `data:` value.
    pub fn from_data(event: &str, data: &str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Self::from_json(event, value),
            Err(_) => StreamEvent::Data {
                event: event.to_string(),
                payload: Payload::Raw(data.to_string()),
            },
        }
    }

    pub fn from_json(event: &str, value: Value) -> Self {
        match event {
            "token" => match value.get("token").and_then(Value::as_str) {
                Some(token) => StreamEvent::Token(token.to_string()),
                None => StreamEvent::Data {
                    event: event.to_string(),
                    payload: Payload::Json(value),
                },
            },
            "citation" => StreamEvent::Citation(value),
            "image" => StreamEvent::Image(value),
            "stage" => StreamEvent::Stage(value),
            "section" => StreamEvent::Section(value),
            "progress" => StreamEvent::Progress(value),
            "done" => StreamEvent::Done(value),
            "error" => StreamEvent::Error {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_STREAM_ERROR)
                    .to_string(),
            },
            other => StreamEvent::Data {
                event: other.to_string(),
                payload: Payload::Json(value),
            },
        }
    }

    /// Event name as it appeared on the wire.
    pub fn name(&self) -> &str {
        match self {
            StreamEvent::Token(_) => "token",
            StreamEvent::Citation(_) => "citation",
            StreamEvent::Image(_) => "image",
            StreamEvent::Stage(_) => "stage",
            StreamEvent::Section(_) => "section",
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Data { event, .. } => event,
        }
    }
}
