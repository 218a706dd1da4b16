use crate::error::{PlatformError, Result};
use crate::traits::ChatPlatform;
use crate::types::{ChannelId, ChannelInfo, HistoryMessage, SlackTimestamp, UserId, UserInfo};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack Web API client authenticated with a bot (or OAuth) token.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    api_base_url: String,
}

impl SlackClient {
    pub fn new(bot_token: &str) -> Result<Self> {
        let token = bot_token.trim();
        if token.is_empty() {
            return Err(PlatformError::InvalidInput(
                "slack bot token is required".to_string(),
            ));
        }
        Ok(Self {
            http: build_http_client(DEFAULT_API_TIMEOUT)?,
            bot_token: token.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        })
    }

    pub fn with_api_base_url(mut self, api_base_url: &str) -> Result<Self> {
        self.api_base_url = normalize_api_base_url(api_base_url)?;
        Ok(self)
    }

    /// Bounds every Web API call; a timed-out call fails as `PlatformError::Http`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http_client(timeout)?;
        Ok(self)
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Url::parse(&format!("{}/{method}", self.api_base_url))
            .map_err(|e| PlatformError::InvalidInput(format!("slack api url for {method}: {e}")))
    }
}

#[async_trait::async_trait]
impl ChatPlatform for SlackClient {
    fn platform_id(&self) -> &str {
        "slack"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(channel = %channel))]
    async fn conversation_history(
        &self,
        channel: &ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let url = self.api_url("conversations.history")?;
        let limit_param = limit.to_string();
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .query(&[
                ("channel", channel.as_str()),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .await?;
        let body: SlackHistoryResponse = read_response("conversations.history", response).await?;

        let mut messages = body
            .messages
            .into_iter()
            .map(|message| -> Result<HistoryMessage> {
                let ts = message.ts.as_deref().ok_or_else(|| {
                    PlatformError::ResponseFormat(format!(
                        "conversations.history message without ts in channel {channel}"
                    ))
                })?;
                let ts = ts
                    .parse::<SlackTimestamp>()
                    .map_err(|e| PlatformError::ResponseFormat(e.to_string()))?;
                Ok(HistoryMessage {
                    user: message
                        .user
                        .filter(|user| !user.trim().is_empty())
                        .map(UserId::from),
                    ts,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by(|left, right| right.ts.cmp(&left.ts));
        messages.truncate(limit);
        tracing::debug!(fetched = messages.len(), "slack history fetched");
        Ok(messages)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user = %user))]
    async fn user_info(&self, user: &UserId) -> Result<UserInfo> {
        let url = self.api_url("users.info")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .query(&[("user", user.as_str())])
            .send()
            .await?;
        let body: SlackUserInfoResponse = read_response("users.info", response).await?;
        Ok(UserInfo {
            id: body.user.id.into(),
            name: body.user.name,
            is_bot: body.user.is_bot,
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_channels(&self, limit: usize) -> Result<Vec<ChannelInfo>> {
        let url = self.api_url("conversations.list")?;
        let limit_param = limit.to_string();
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .query(&[
                ("limit", limit_param.as_str()),
                ("exclude_archived", "true"),
            ])
            .send()
            .await?;
        let body: SlackConversationsListResponse =
            read_response("conversations.list", response).await?;
        Ok(body
            .channels
            .into_iter()
            .map(|channel| ChannelInfo {
                id: channel.id.into(),
                name: channel.name,
            })
            .collect())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(channel = %channel))]
    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlatformError::InvalidInput(
                "message text is empty".to_string(),
            ));
        }
        let payload = serde_json::json!({
            "channel": channel.as_str(),
            "text": text,
        });
        let url = self.api_url("chat.postMessage")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await?;
        let _: serde_json::Value = read_response("chat.postMessage", response).await?;
        Ok(())
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    if timeout.is_zero() {
        return Err(PlatformError::InvalidInput(
            "slack api timeout must be > 0".to_string(),
        ));
    }
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub(crate) fn normalize_api_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| PlatformError::InvalidInput(format!("slack api base url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(PlatformError::InvalidInput(format!(
            "slack api base url must be http or https, got {other}"
        ))),
    }
}

/// Decodes a Web API response, turning `ok: false` into `PlatformError::Api`.
pub(crate) async fn read_response<T: DeserializeOwned>(
    method: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) if !status.is_success() => {
            return Err(PlatformError::Http(format!(
                "slack {method} returned status {status}"
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if value.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let code = value
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("status {status}"));
        return Err(PlatformError::Api { method, code });
    }
    Ok(serde_json::from_value(value)?)
}

#[derive(Debug, Deserialize)]
struct SlackHistoryResponse {
    #[serde(default)]
    messages: Vec<SlackHistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct SlackHistoryMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUserInfoResponse {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
struct SlackConversationsListResponse {
    #[serde(default)]
    channels: Vec<SlackChannel>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
    #[serde(default)]
    name: String,
}
