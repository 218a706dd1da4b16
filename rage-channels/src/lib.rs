//! Slack I/O for slack-rage.
//!
//! Everything here is plumbing: typed ids and timestamps, the Web API client
//! behind the `ChatPlatform` trait, Events API payload decoding and the
//! Socket Mode stream. Detection logic lives in `rage-core`.

mod error;
mod events;
mod slack;
mod socket_mode;
mod traits;
mod types;

pub use error::{DecodeError, PlatformError, Result};
pub use events::{CallbackEvent, EventsApiPayload};
pub use slack::{DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT, SlackClient};
pub use socket_mode::{SocketModeClient, StreamEvent};
pub use traits::ChatPlatform;
pub use types::{
    ChannelId, ChannelInfo, EventId, HistoryMessage, InvalidTimestamp, Message, SlackTimestamp,
    UserId, UserInfo,
};
