use crate::error::Result;
use crate::types::{ChannelId, ChannelInfo, HistoryMessage, UserId, UserInfo};
use async_trait::async_trait;

/// The chat-platform calls the rage pipeline depends on.
///
/// Every method is a network round trip; implementations bound each call
/// with a timeout and report it as an ordinary error.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Platform identifier used in logs: "slack".
    fn platform_id(&self) -> &str;

    /// Up to `limit` most recent messages in `channel`, newest first.
    async fn conversation_history(
        &self,
        channel: &ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;

    async fn user_info(&self, user: &UserId) -> Result<UserInfo>;

    /// A single page of at most `limit` channels.
    async fn list_channels(&self, limit: usize) -> Result<Vec<ChannelInfo>>;

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()>;
}
