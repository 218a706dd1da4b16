use crate::bot_filter::BotFilter;
use crate::detector::{DetectionPolicy, RageDetector, Verdict};
use crate::error::RageError;
use crate::gate::{GateOutcome, NotificationGate};
use crate::notifier::Notifier;
use rage_channels::{ChatPlatform, Message};
use std::sync::Arc;
use std::time::Duration;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AuthorIsBot,
    /// The triggering author could not be looked up; nothing was evaluated.
    AuthorUnverified,
    NoRage(Verdict),
    Notified(Verdict),
    Suppressed { verdict: Verdict, since_last: Duration },
}

/// Bot filter, detector and notification gate wired together.
///
/// Owns the process-wide notification history; both ingress paths share one
/// instance.
pub struct RageService {
    bot_filter: BotFilter,
    detector: RageDetector,
    gate: NotificationGate,
}

impl RageService {
    pub fn new(platform: Arc<dyn ChatPlatform>, policy: DetectionPolicy, notifier: Notifier) -> Self {
        let bot_filter = BotFilter::new(platform.clone());
        Self {
            detector: RageDetector::new(platform, bot_filter.clone(), policy),
            bot_filter,
            gate: NotificationGate::new(notifier),
        }
    }

    pub fn policy(&self) -> &DetectionPolicy {
        self.detector.policy()
    }

    pub fn notifier(&self) -> &Notifier {
        self.gate.notifier()
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(channel = %message.channel_id, author = %message.author_id, ts = %message.ts)
    )]
    pub async fn handle_message(&self, message: &Message) -> Result<Outcome, RageError> {
        match self.bot_filter.is_bot(&message.author_id).await {
            Ok(true) => {
                tracing::info!("user is bot");
                return Ok(Outcome::AuthorIsBot);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::error!(%error, "can not get user info");
                return Ok(Outcome::AuthorUnverified);
            }
        }

        let verdict = self.detector.evaluate(message).await?;
        if !verdict.is_rage() {
            tracing::debug!(?verdict, "no rage");
            return Ok(Outcome::NoRage(verdict));
        }

        tracing::info!(?verdict, "rage detected");
        match self.gate.try_notify(&message.channel_id).await? {
            GateOutcome::Notified => Ok(Outcome::Notified(verdict)),
            GateOutcome::Suppressed { since_last } => Ok(Outcome::Suppressed {
                verdict,
                since_last,
            }),
        }
    }
}
