//! Two-gate rage heuristic.
//!
//! Gate 1 (recency): the last `threshold` messages of the channel must fit
//! inside `period`, measured from the oldest of them to the triggering
//! message. Gate 2 (breadth): at least `min_speakers` distinct human authors
//! must appear in that same window.

use crate::bot_filter::BotFilter;
use futures_util::future::join_all;
use rage_channels::{
    ChatPlatform, HistoryMessage, Message, PlatformError, SlackTimestamp, UserId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_THRESHOLD: usize = 10;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_MIN_SPEAKERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionPolicy {
    /// Window size in messages.
    pub threshold: usize,
    pub period: Duration,
    pub min_speakers: usize,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            period: DEFAULT_PERIOD,
            min_speakers: DEFAULT_MIN_SPEAKERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The channel returned no history at all.
    EmptyWindow,
    TooSparse { span: Duration, period: Duration },
    TooFewSpeakers { speakers: usize, required: usize },
    Rage { span: Duration, speakers: usize },
}

impl Verdict {
    pub fn is_rage(&self) -> bool {
        matches!(self, Self::Rage { .. })
    }
}

/// The most recent messages of a channel, newest first, never longer than
/// the threshold it was built with.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    messages: Vec<HistoryMessage>,
}

impl ConversationWindow {
    pub fn bounded(mut messages: Vec<HistoryMessage>, threshold: usize) -> Self {
        messages.sort_by(|left, right| right.ts.cmp(&left.ts));
        messages.truncate(threshold);
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn oldest(&self) -> Option<&HistoryMessage> {
        self.messages.last()
    }

    /// Time from the oldest message in the window to `until`.
    ///
    /// The sub-second part of both timestamps is kept, so a window starting
    /// at `940.0` spans 60.5 s until `1000.5` and misses a 60 s period.
    pub fn span_until(&self, until: &SlackTimestamp) -> Option<Duration> {
        self.oldest().map(|oldest| until.elapsed_since(&oldest.ts))
    }

    /// Distinct author ids; messages without a user contribute none.
    pub fn authors(&self) -> BTreeSet<UserId> {
        self.messages
            .iter()
            .filter_map(|message| message.user.clone())
            .collect()
    }
}

pub struct RageDetector {
    platform: Arc<dyn ChatPlatform>,
    bot_filter: BotFilter,
    policy: DetectionPolicy,
}

impl RageDetector {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        bot_filter: BotFilter,
        policy: DetectionPolicy,
    ) -> Self {
        Self {
            platform,
            bot_filter,
            policy,
        }
    }

    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Decides whether the conversation around `message` is a rage burst.
    ///
    /// Fails only when the history itself cannot be fetched; individual user
    /// lookups degrade to excluding that author.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(channel = %message.channel_id, ts = %message.ts)
    )]
    pub async fn evaluate(&self, message: &Message) -> Result<Verdict, PlatformError> {
        let history = self
            .platform
            .conversation_history(&message.channel_id, self.policy.threshold)
            .await?;
        let window = ConversationWindow::bounded(history, self.policy.threshold);

        let Some(span) = window.span_until(&message.ts) else {
            tracing::debug!("channel history is empty");
            return Ok(Verdict::EmptyWindow);
        };
        tracing::info!(
            span_ms = span.as_millis() as u64,
            window = window.len(),
            period_secs = self.policy.period.as_secs(),
            "window span computed"
        );
        if span > self.policy.period {
            return Ok(Verdict::TooSparse {
                span,
                period: self.policy.period,
            });
        }

        let speakers = self.count_human_speakers(&window).await;
        tracing::info!(
            speakers,
            required = self.policy.min_speakers,
            "speakers in the conversation"
        );
        if speakers < self.policy.min_speakers {
            return Ok(Verdict::TooFewSpeakers {
                speakers,
                required: self.policy.min_speakers,
            });
        }
        Ok(Verdict::Rage { span, speakers })
    }

    async fn count_human_speakers(&self, window: &ConversationWindow) -> usize {
        let authors = window.authors();
        let verdicts =
            join_all(authors.iter().map(|author| self.bot_filter.screen(author))).await;
        for (author, verdict) in authors.iter().zip(&verdicts) {
            if !verdict.counts_as_speaker() {
                tracing::debug!(%author, ?verdict, "author dropped from speaker set");
            }
        }
        verdicts
            .iter()
            .filter(|verdict| verdict.counts_as_speaker())
            .count()
    }
}
