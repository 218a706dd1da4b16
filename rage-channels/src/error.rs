use crate::types::InvalidTimestamp;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Slack error codes that mean the token itself is unusable.
const AUTH_FAILURE_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "not_allowed_token_type",
];

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("slack {method} failed: {code}")]
    Api { method: &'static str, code: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("websocket error: {0}")]
    Socket(String),

    #[error("stream event queue closed")]
    QueueClosed,
}

impl PlatformError {
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Api { code, .. } => AUTH_FAILURE_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PlatformError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(e.to_string())
    }
}

/// Failure to turn an inbound Events API payload into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has no type")]
    MissingType,

    #[error("event_callback payload has no event object")]
    MissingEvent,

    #[error("message event is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Timestamp(#[from] InvalidTimestamp),
}
