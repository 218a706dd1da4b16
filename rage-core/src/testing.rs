//! In-memory `ChatPlatform` for unit tests.

use async_trait::async_trait;
use rage_channels::{
    ChannelId, ChannelInfo, ChatPlatform, HistoryMessage, PlatformError, Result, SlackTimestamp,
    UserId, UserInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct FakePlatform {
    history: Mutex<HashMap<ChannelId, Vec<HistoryMessage>>>,
    bots: HashSet<UserId>,
    failing_users: HashSet<UserId>,
    channels: Vec<ChannelInfo>,
    fail_history: bool,
    fail_post: bool,
    post_delay: Option<Duration>,
    posts: Mutex<Vec<(ChannelId, String)>>,
    user_lookups: AtomicUsize,
    channel_listings: AtomicUsize,
}

impl FakePlatform {
    pub fn with_bot(mut self, user: &str) -> Self {
        self.bots.insert(UserId::from(user));
        self
    }

    pub fn with_failing_user(mut self, user: &str) -> Self {
        self.failing_users.insert(UserId::from(user));
        self
    }

    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.push(ChannelInfo {
            id: ChannelId::from(id),
            name: name.to_string(),
        });
        self
    }

    pub fn with_history(self, channel: &str, messages: Vec<HistoryMessage>) -> Self {
        self.set_history(channel, messages);
        self
    }

    pub fn with_failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn with_failing_post(mut self) -> Self {
        self.fail_post = true;
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = Some(delay);
        self
    }

    pub fn set_history(&self, channel: &str, messages: Vec<HistoryMessage>) {
        self.history
            .lock()
            .expect("history lock")
            .insert(ChannelId::from(channel), messages);
    }

    pub fn posts(&self) -> Vec<(ChannelId, String)> {
        self.posts.lock().expect("posts lock").clone()
    }

    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    pub fn channel_listings(&self) -> usize {
        self.channel_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn platform_id(&self) -> &str {
        "fake"
    }

    async fn conversation_history(
        &self,
        channel: &ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        if self.fail_history {
            return Err(PlatformError::Http("history unavailable".to_string()));
        }
        let history = self.history.lock().expect("history lock");
        let mut messages = history.get(channel).cloned().unwrap_or_default();
        messages.sort_by(|left, right| right.ts.cmp(&left.ts));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn user_info(&self, user: &UserId) -> Result<UserInfo> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_users.contains(user) {
            return Err(PlatformError::Api {
                method: "users.info",
                code: "user_not_found".to_string(),
            });
        }
        Ok(UserInfo {
            id: user.clone(),
            name: user.to_lowercase(),
            is_bot: self.bots.contains(user),
        })
    }

    async fn list_channels(&self, limit: usize) -> Result<Vec<ChannelInfo>> {
        self.channel_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.iter().take(limit).cloned().collect())
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        if let Some(delay) = self.post_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_post {
            return Err(PlatformError::Api {
                method: "chat.postMessage",
                code: "channel_not_found".to_string(),
            });
        }
        self.posts
            .lock()
            .expect("posts lock")
            .push((channel.clone(), text.to_string()));
        Ok(())
    }
}

pub fn ts(raw: &str) -> SlackTimestamp {
    raw.parse().expect("test timestamp")
}

pub fn message_at(user: Option<&str>, seconds: f64) -> HistoryMessage {
    HistoryMessage {
        user: user.map(UserId::from),
        ts: ts(&format!("{seconds:.6}")),
    }
}

/// `count` messages spread evenly over `span_seconds`, newest at `newest`,
/// with authors taken round-robin from `authors`.
pub fn burst(newest: f64, span_seconds: f64, count: usize, authors: &[&str]) -> Vec<HistoryMessage> {
    let step = if count > 1 {
        span_seconds / (count - 1) as f64
    } else {
        0.0
    };
    (0..count)
        .map(|i| message_at(Some(authors[i % authors.len()]), newest - step * i as f64))
        .collect()
}
