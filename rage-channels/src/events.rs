//! Typed decoding of Slack Events API payloads.
//!
//! The same `event_callback` shape arrives over the HTTP webhook and inside
//! Socket Mode `events_api` envelopes, so both ingress paths share this step.

use crate::error::DecodeError;
use crate::types::{ChannelId, EventId, Message, SlackTimestamp, UserId};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventsApiPayload {
    /// Endpoint handshake; the challenge must be echoed back verbatim.
    UrlVerification { challenge: String },
    EventCallback {
        event_id: Option<EventId>,
        event: CallbackEvent,
    },
    /// Any other top-level type (`app_rate_limited`, ...).
    Other { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    Message(Message),
    /// Events that never feed detection: other event types and message
    /// subtypes such as edits, deletions, joins and bot posts.
    Ignored { kind: String },
}

impl EventsApiPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawPayload = serde_json::from_slice(body)?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let raw: RawPayload = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPayload) -> Result<Self, DecodeError> {
        let kind = raw
            .kind
            .filter(|kind| !kind.trim().is_empty())
            .ok_or(DecodeError::MissingType)?;
        match kind.as_str() {
            "url_verification" => Ok(Self::UrlVerification {
                challenge: raw.challenge.unwrap_or_default(),
            }),
            "event_callback" => {
                let event = match raw.event {
                    Some(event @ Value::Object(_)) => decode_callback_event(event)?,
                    _ => return Err(DecodeError::MissingEvent),
                };
                Ok(Self::EventCallback {
                    event_id: raw
                        .event_id
                        .filter(|id| !id.trim().is_empty())
                        .map(EventId::from),
                    event,
                })
            }
            _ => Ok(Self::Other { kind }),
        }
    }
}

fn decode_callback_event(value: Value) -> Result<CallbackEvent, DecodeError> {
    let event: RawEvent = serde_json::from_value(value)?;
    let kind = event.kind.unwrap_or_default();
    if kind != "message" {
        return Ok(CallbackEvent::Ignored { kind });
    }
    if let Some(subtype) = event.subtype {
        return Ok(CallbackEvent::Ignored {
            kind: format!("message.{subtype}"),
        });
    }

    let channel_id = required(event.channel, "channel")?;
    let author_id = required(event.user, "user")?;
    let ts = required(event.ts, "ts")?.parse::<SlackTimestamp>()?;
    Ok(CallbackEvent::Message(Message {
        channel_id: ChannelId::from(channel_id),
        author_id: UserId::from(author_id),
        ts,
    }))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DecodeError::MissingField(field)),
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}
