//! Rage detection for chat channels.
//!
//! A message triggers an evaluation of the channel's recent history: the
//! last `threshold` messages must span at most `period` and involve at least
//! `min_speakers` distinct humans. Positive evaluations pass through a
//! per-channel cooldown before a notification is posted.

mod bot_filter;
mod dedup;
mod detector;
mod error;
mod gate;
mod notifier;
mod service;

#[cfg(test)]
mod testing;

pub use bot_filter::{BotFilter, SpeakerVerdict};
pub use dedup::{Admission, InFlightGuard, InboundDeduplicator};
pub use detector::{
    ConversationWindow, DEFAULT_MIN_SPEAKERS, DEFAULT_PERIOD, DEFAULT_THRESHOLD, DetectionPolicy,
    RageDetector, Verdict,
};
pub use error::{NotifyError, RageError};
pub use gate::{GateOutcome, NOTIFY_COOLDOWN, NotificationGate};
pub use notifier::{CHANNEL_LIST_LIMIT, DEFAULT_TEMPLATE, Notifier};
pub use service::{Outcome, RageService};
