use rage_channels::{ChatPlatform, PlatformError, UserId};
use std::sync::Arc;

/// Outcome of screening one author for the speaker set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerVerdict {
    Human,
    Bot,
    /// The lookup failed; the author is left out of the speaker set rather
    /// than failing the whole evaluation.
    Excluded { reason: String },
}

impl SpeakerVerdict {
    pub fn counts_as_speaker(&self) -> bool {
        matches!(self, Self::Human)
    }
}

/// Answers "is this user a bot" by asking the platform every time.
#[derive(Clone)]
pub struct BotFilter {
    platform: Arc<dyn ChatPlatform>,
}

impl BotFilter {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self { platform }
    }

    pub async fn is_bot(&self, user: &UserId) -> Result<bool, PlatformError> {
        let info = self.platform.user_info(user).await?;
        tracing::debug!(user = %info.id, name = %info.name, is_bot = info.is_bot, "author resolved");
        Ok(info.is_bot)
    }

    pub async fn screen(&self, user: &UserId) -> SpeakerVerdict {
        match self.is_bot(user).await {
            Ok(true) => SpeakerVerdict::Bot,
            Ok(false) => SpeakerVerdict::Human,
            Err(error) => {
                tracing::warn!(%user, %error, "user lookup failed; excluding from speakers");
                SpeakerVerdict::Excluded {
                    reason: error.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BotFilter, SpeakerVerdict};
    use crate::testing::FakePlatform;
    use rage_channels::UserId;
    use std::sync::Arc;

    #[tokio::test]
    async fn screen_classifies_humans_bots_and_failed_lookups() {
        let platform = Arc::new(
            FakePlatform::default()
                .with_bot("UBOT")
                .with_failing_user("UGONE"),
        );
        let filter = BotFilter::new(platform.clone());

        assert_eq!(filter.screen(&UserId::from("U1")).await, SpeakerVerdict::Human);
        assert_eq!(filter.screen(&UserId::from("UBOT")).await, SpeakerVerdict::Bot);
        let excluded = filter.screen(&UserId::from("UGONE")).await;
        assert!(matches!(excluded, SpeakerVerdict::Excluded { .. }));
        assert!(!excluded.counts_as_speaker());
    }

    #[tokio::test]
    async fn is_bot_queries_the_platform_on_every_call() {
        let platform = Arc::new(FakePlatform::default());
        let filter = BotFilter::new(platform.clone());

        for _ in 0..3 {
            assert!(!filter.is_bot(&UserId::from("U1")).await.expect("lookup"));
        }
        assert_eq!(platform.user_lookups(), 3);
    }

    #[tokio::test]
    async fn is_bot_propagates_lookup_errors() {
        let platform = Arc::new(FakePlatform::default().with_failing_user("UGONE"));
        let filter = BotFilter::new(platform);
        assert!(filter.is_bot(&UserId::from("UGONE")).await.is_err());
    }
}
