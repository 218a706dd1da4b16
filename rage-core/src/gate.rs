use crate::error::NotifyError;
use crate::notifier::Notifier;
use dashmap::DashMap;
use rage_channels::ChannelId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum time between two notifications for the same channel.
pub const NOTIFY_COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Notified,
    Suppressed { since_last: Duration },
}

/// Per-channel cooldown in front of the notifier.
///
/// Each channel has its own async mutex, held from the cooldown check until
/// the new timestamp is recorded, so two concurrent fire requests for one
/// channel cannot both post. Channels never block each other.
pub struct NotificationGate {
    notifier: Notifier,
    cooldown: Duration,
    history: DashMap<ChannelId, Arc<Mutex<Option<Instant>>>>,
}

impl NotificationGate {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier,
            cooldown: NOTIFY_COOLDOWN,
            history: DashMap::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Time of the last successful notification for `channel`, if any.
    pub async fn last_notified(&self, channel: &ChannelId) -> Option<Instant> {
        let slot = self.history.get(channel).map(|slot| slot.value().clone())?;
        let last = *slot.lock().await;
        last
    }

    #[tracing::instrument(level = "info", skip_all, fields(channel = %channel))]
    pub async fn try_notify(&self, channel: &ChannelId) -> Result<GateOutcome, NotifyError> {
        let slot = self
            .history
            .entry(channel.clone())
            .or_default()
            .value()
            .clone();
        let mut last = slot.lock().await;

        let now = Instant::now();
        if let Some(previous) = *last {
            let since_last = now.saturating_duration_since(previous);
            if since_last < self.cooldown {
                tracing::info!(
                    since_last_secs = since_last.as_secs(),
                    cooldown_secs = self.cooldown.as_secs(),
                    "skip notification because of cool time"
                );
                return Ok(GateOutcome::Suppressed { since_last });
            }
        }

        self.notifier.post(channel).await?;
        *last = Some(now);
        Ok(GateOutcome::Notified)
    }
}
