use crate::error::NotifyError;
use rage_channels::{ChannelId, ChatPlatform};
use std::sync::Arc;

/// Page size for the channel lookup; only the first page is searched.
pub const CHANNEL_LIST_LIMIT: usize = 999;
pub const DEFAULT_TEMPLATE: &str = "<#{channel}> looks like it's heating up!";
const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Posts the "heating up" message to the configured target channel.
#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn ChatPlatform>,
    target: String,
    template: String,
}

impl Notifier {
    /// `target` is a channel *name*; a leading `#` is ignored.
    pub fn new(platform: Arc<dyn ChatPlatform>, target: &str) -> Self {
        Self {
            platform,
            target: target.trim().trim_start_matches('#').to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn render(&self, source: &ChannelId) -> String {
        self.template.replace(CHANNEL_PLACEHOLDER, source.as_str())
    }

    pub async fn resolve_target(&self) -> Result<ChannelId, NotifyError> {
        let channels = self.platform.list_channels(CHANNEL_LIST_LIMIT).await?;
        channels
            .into_iter()
            .find(|channel| channel.name == self.target)
            .map(|channel| channel.id)
            .ok_or_else(|| NotifyError::TargetChannelNotFound(self.target.clone()))
    }

    #[tracing::instrument(level = "info", skip(self), fields(target = %self.target))]
    pub async fn post(&self, source: &ChannelId) -> Result<(), NotifyError> {
        let target = self.resolve_target().await?;
        self.platform
            .post_message(&target, &self.render(source))
            .await?;
        tracing::info!(target_id = %target, "notification posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Notifier;
    use crate::error::NotifyError;
    use crate::testing::FakePlatform;
    use rage_channels::ChannelId;
    use std::sync::Arc;

    #[tokio::test]
    async fn post_resolves_target_by_name_and_references_source() {
        let platform = Arc::new(
            FakePlatform::default()
                .with_channel("C0", "general")
                .with_channel("C9", "random"),
        );
        let notifier = Notifier::new(platform.clone(), "#random");

        notifier.post(&ChannelId::from("C1")).await.expect("post");

        let posts = platform.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, ChannelId::from("C9"));
        assert_eq!(posts[0].1, "<#C1> looks like it's heating up!");
        assert_eq!(platform.channel_listings(), 1);
    }

    #[tokio::test]
    async fn missing_target_channel_fails_without_posting() {
        let platform = Arc::new(FakePlatform::default().with_channel("C0", "general"));
        let notifier = Notifier::new(platform.clone(), "alerts");

        let error = notifier
            .post(&ChannelId::from("C1"))
            .await
            .expect_err("unknown channel");
        assert!(matches!(error, NotifyError::TargetChannelNotFound(ref name) if name == "alerts"));
        assert!(platform.posts().is_empty());
    }

    #[tokio::test]
    async fn post_failure_is_surfaced() {
        let platform = Arc::new(
            FakePlatform::default()
                .with_channel("C9", "random")
                .with_failing_post(),
        );
        let notifier = Notifier::new(platform, "random");
        let error = notifier
            .post(&ChannelId::from("C1"))
            .await
            .expect_err("post fails");
        assert!(matches!(error, NotifyError::Platform(_)));
    }

    #[test]
    fn custom_template_substitutes_channel() {
        let notifier = Notifier::new(Arc::new(FakePlatform::default()), "random")
            .with_template("rage in <#{channel}>");
        assert_eq!(notifier.render(&ChannelId::from("C7")), "rage in <#C7>");
        assert_eq!(notifier.target(), "random");
    }
}
