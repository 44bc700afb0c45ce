use serde_json::Value;

/// Whether a text block carries the user-visible reply or agent-level
/// narration. The wire distinguishes the two as the `text-*` and
/// `reasoning-*` event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextChannel {
    Reply,
    Narration,
}

/// Decoded stream event after normalization.
///
/// Unknown `type` values map to [`StreamEvent::Unknown`] so callers can
/// observe (and ignore) them explicitly instead of relying on silent
/// duck-typing.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start {
        message_id: Option<String>,
    },
    TextStart {
        id: String,
        channel: TextChannel,
    },
    TextDelta {
        id: String,
        channel: TextChannel,
        delta: String,
    },
    TextEnd {
        id: String,
        channel: TextChannel,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    /// Agent-specific `data-*` payload; `name` is the suffix after `data-`.
    Data {
        name: String,
        data: Value,
    },
    Finish,
    Unknown {
        event_type: String,
        payload: Value,
    },
}

impl StreamEvent {
    /// Maps one parsed payload to an event. Returns `None` when a required
    /// per-variant field is missing; the payload then counts as malformed.
    pub fn from_value(value: Value) -> Option<StreamEvent> {
        let event_type = value.get("type")?.as_str()?.to_string();

        let event = match event_type.as_str() {
            "start" => StreamEvent::Start {
                message_id: string_field(&value, "messageId"),
            },
            "text-start" => StreamEvent::TextStart {
                id: string_field(&value, "id")?,
                channel: TextChannel::Reply,
            },
            "text-delta" => StreamEvent::TextDelta {
                id: string_field(&value, "id")?,
                channel: TextChannel::Reply,
                delta: string_field(&value, "delta")?,
            },
            "text-end" => StreamEvent::TextEnd {
                id: string_field(&value, "id")?,
                channel: TextChannel::Reply,
            },
            "reasoning-start" => StreamEvent::TextStart {
                id: string_field(&value, "id")?,
                channel: TextChannel::Narration,
            },
            "reasoning-delta" => StreamEvent::TextDelta {
                id: string_field(&value, "id")?,
                channel: TextChannel::Narration,
                delta: string_field(&value, "delta")?,
            },
            "reasoning-end" => StreamEvent::TextEnd {
                id: string_field(&value, "id")?,
                channel: TextChannel::Narration,
            },
            "tool-input-available" => StreamEvent::ToolInputAvailable {
                tool_call_id: string_field(&value, "toolCallId")?,
                tool_name: string_field(&value, "toolName")?,
                input: value.get("input").cloned().unwrap_or(Value::Null),
            },
            "tool-output-available" => StreamEvent::ToolOutputAvailable {
                tool_call_id: string_field(&value, "toolCallId")?,
                output: value.get("output").cloned().unwrap_or(Value::Null),
            },
            "finish" => StreamEvent::Finish,
            other => {
                if let Some(name) = other.strip_prefix("data-") {
                    StreamEvent::Data {
                        name: name.to_string(),
                        data: value.get("data").cloned().unwrap_or(Value::Null),
                    }
                } else {
                    StreamEvent::Unknown {
                        event_type: other.to_string(),
                        payload: value,
                    }
                }
            }
        };

        Some(event)
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
