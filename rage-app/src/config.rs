//! slack-rage configuration loader.
//!
//! Layering: optional TOML file, then environment, then command-line flags.

use rage_core::{DEFAULT_MIN_SPEAKERS, DEFAULT_TEMPLATE, DEFAULT_THRESHOLD, DetectionPolicy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Which ingress the process runs; a few defaults depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressMode {
    Event,
    Stream,
    Handshake,
}

impl IngressMode {
    fn default_period_seconds(self) -> u64 {
        match self {
            Self::Stream => 1200,
            Self::Event | Self::Handshake => 60,
        }
    }

    fn needs_bot_token(self) -> bool {
        !matches!(self, Self::Handshake)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RageConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Unset means "pick the default for the ingress mode".
    #[serde(default)]
    pub period_seconds: Option<u64>,
    #[serde(default = "default_speakers")]
    pub speakers: usize,
}

fn default_threshold() -> usize {
    DEFAULT_THRESHOLD
}

fn default_speakers() -> usize {
    DEFAULT_MIN_SPEAKERS
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            period_seconds: None,
            speakers: default_speakers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_channel")]
    pub channel: String,
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_notify_channel() -> String {
    "random".to_string()
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: default_notify_channel(),
            template: default_template(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub app_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,
}

fn default_api_base_url() -> String {
    rage_channels::DEFAULT_API_BASE_URL.to_string()
}

fn default_api_timeout_seconds() -> u64 {
    rage_channels::DEFAULT_API_TIMEOUT.as_secs()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            api_base_url: default_api_base_url(),
            api_timeout_seconds: default_api_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Sequential platform calls one webhook evaluation can make: the author
/// lookup, history, the speaker lookups (concurrent), the channel listing and
/// the post.
const PLATFORM_CALLS_PER_MESSAGE: u64 = 5;

fn default_http_timeout_seconds() -> u64 {
    60
}

fn default_http_max_in_flight() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Values taken from the command line (clap already folded in the `RAGE_*`
/// environment variables for these).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threshold: Option<usize>,
    pub period_seconds: Option<u64>,
    pub speakers: Option<usize>,
    pub notify_channel: Option<String>,
    pub bind_addr: Option<String>,
}

impl RageConfig {
    pub async fn load(
        path: Option<&Path>,
        mode: IngressMode,
        overrides: &CliOverrides,
    ) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
                Self::from_toml_str(&contents)
                    .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?
            }
            None => Self::default(),
        };

        cfg.apply_env_overrides(mode, |key| std::env::var(key).ok());
        cfg.apply_cli_overrides(mode, overrides);
        cfg.validate(mode)?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self, mode: IngressMode, env: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("SLACK_TOKEN") {
            self.slack.bot_token = v;
        }
        if mode == IngressMode::Stream {
            if let Some(v) = lookup("OAUTH_TOKEN") {
                self.slack.bot_token = v;
            }
        }
        if let Some(v) = lookup("SLACK_APP_TOKEN") {
            self.slack.app_token = v;
        }
        if let Some(v) = lookup("SLACK_API_BASE_URL") {
            self.slack.api_base_url = v;
        }
    }

    fn apply_cli_overrides(&mut self, mode: IngressMode, overrides: &CliOverrides) {
        if let Some(threshold) = overrides.threshold {
            self.detection.threshold = threshold;
        }
        if let Some(period) = overrides.period_seconds {
            self.detection.period_seconds = Some(period);
        }
        if let Some(speakers) = overrides.speakers {
            self.detection.speakers = speakers;
        }
        if let Some(channel) = overrides.notify_channel.as_ref() {
            self.notify.channel = channel.clone();
        }
        if let Some(bind_addr) = overrides.bind_addr.as_ref() {
            self.server.bind_addr = bind_addr.clone();
        }
        self.detection
            .period_seconds
            .get_or_insert(mode.default_period_seconds());
    }

    fn validate(&self, mode: IngressMode) -> anyhow::Result<()> {
        if self.detection.threshold == 0 {
            return Err(anyhow::anyhow!("detection.threshold must be > 0"));
        }
        if self.detection.speakers == 0 {
            return Err(anyhow::anyhow!("detection.speakers must be > 0"));
        }
        if self.detection.period_seconds == Some(0) {
            return Err(anyhow::anyhow!("detection.period_seconds must be > 0"));
        }
        if self.notify.channel.trim().trim_start_matches('#').is_empty() {
            return Err(anyhow::anyhow!("notify.channel is required"));
        }
        if !self.notify.template.contains("{channel}") {
            return Err(anyhow::anyhow!(
                "notify.template must contain the {{channel}} placeholder"
            ));
        }
        if self.slack.api_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("slack.api_timeout_seconds must be > 0"));
        }
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if mode == IngressMode::Event {
            let floor = self
                .slack
                .api_timeout_seconds
                .saturating_mul(PLATFORM_CALLS_PER_MESSAGE);
            if self.server.http_timeout_seconds < floor {
                return Err(anyhow::anyhow!(
                    "server.http_timeout_seconds ({}) must be at least {floor} ({PLATFORM_CALLS_PER_MESSAGE} x slack.api_timeout_seconds)",
                    self.server.http_timeout_seconds
                ));
            }
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        self.bind_addr()?;
        if mode.needs_bot_token() && self.slack.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "slack.bot_token is required (set SLACK_TOKEN)"
            ));
        }
        if mode == IngressMode::Stream {
            if self.slack.app_token.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "slack.app_token is required for stream mode (set SLACK_APP_TOKEN)"
                ));
            }
            if self.stream.reconnect_delay_ms == 0 {
                return Err(anyhow::anyhow!("stream.reconnect_delay_ms must be > 0"));
            }
        }
        Ok(())
    }

    pub fn detection_policy(&self) -> DetectionPolicy {
        DetectionPolicy {
            threshold: self.detection.threshold,
            period: self.period(),
            min_speakers: self.detection.speakers,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(
            self.detection
                .period_seconds
                .unwrap_or(IngressMode::Event.default_period_seconds()),
        )
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.slack.api_timeout_seconds)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{CliOverrides, IngressMode, RageConfig};
    use std::collections::HashMap;
    use std::time::Duration;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn resolve(
        toml: &str,
        mode: IngressMode,
        env: &[(&str, &str)],
        overrides: CliOverrides,
    ) -> anyhow::Result<RageConfig> {
        let mut cfg = RageConfig::from_toml_str(toml)?;
        cfg.apply_env_overrides(mode, env_of(env));
        cfg.apply_cli_overrides(mode, &overrides);
        cfg.validate(mode)?;
        Ok(cfg)
    }

    #[test]
    fn defaults_depend_on_ingress_mode() {
        let event = resolve("", IngressMode::Event, &[("SLACK_TOKEN", "xoxb-1")], CliOverrides::default())
            .expect("event config");
        assert_eq!(event.detection.threshold, 10);
        assert_eq!(event.detection.speakers, 3);
        assert_eq!(event.period(), Duration::from_secs(60));
        assert_eq!(event.notify.channel, "random");
        assert_eq!(event.bind_addr().expect("addr").port(), 9090);

        let stream = resolve(
            "",
            IngressMode::Stream,
            &[("SLACK_TOKEN", "xoxb-1"), ("SLACK_APP_TOKEN", "xapp-1")],
            CliOverrides::default(),
        )
        .expect("stream config");
        assert_eq!(stream.period(), Duration::from_secs(1200));
    }

    #[test]
    fn cli_wins_over_file_and_env_wins_over_file() {
        let toml = r#"
            [detection]
            threshold = 20
            period_seconds = 120

            [notify]
            channel = "alerts"

            [slack]
            bot_token = "xoxb-file"
        "#;
        let cfg = resolve(
            toml,
            IngressMode::Event,
            &[("SLACK_TOKEN", "xoxb-env")],
            CliOverrides {
                threshold: Some(5),
                notify_channel: Some("#ops".to_string()),
                ..CliOverrides::default()
            },
        )
        .expect("config");

        assert_eq!(cfg.detection.threshold, 5);
        assert_eq!(cfg.period(), Duration::from_secs(120));
        assert_eq!(cfg.notify.channel, "#ops");
        assert_eq!(cfg.slack.bot_token, "xoxb-env");
    }

    #[test]
    fn oauth_token_wins_only_in_stream_mode() {
        let env = [
            ("SLACK_TOKEN", "xoxb-slack"),
            ("OAUTH_TOKEN", "xoxp-oauth"),
            ("SLACK_APP_TOKEN", "xapp-1"),
        ];
        let stream = resolve("", IngressMode::Stream, &env, CliOverrides::default()).expect("stream");
        assert_eq!(stream.slack.bot_token, "xoxp-oauth");

        let event = resolve("", IngressMode::Event, &env, CliOverrides::default()).expect("event");
        assert_eq!(event.slack.bot_token, "xoxb-slack");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let token = [("SLACK_TOKEN", "xoxb-1")];
        let zero_threshold = CliOverrides {
            threshold: Some(0),
            ..CliOverrides::default()
        };
        assert!(resolve("", IngressMode::Event, &token, zero_threshold).is_err());

        let zero_period = CliOverrides {
            period_seconds: Some(0),
            ..CliOverrides::default()
        };
        assert!(resolve("", IngressMode::Event, &token, zero_period).is_err());

        let bare_hash = CliOverrides {
            notify_channel: Some("#".to_string()),
            ..CliOverrides::default()
        };
        assert!(resolve("", IngressMode::Event, &token, bare_hash).is_err());

        let no_placeholder = "[notify]\ntemplate = \"heating up\"\n";
        assert!(resolve(no_placeholder, IngressMode::Event, &token, CliOverrides::default()).is_err());

        let bad_bind = CliOverrides {
            bind_addr: Some("not-an-addr".to_string()),
            ..CliOverrides::default()
        };
        assert!(resolve("", IngressMode::Event, &token, bad_bind).is_err());
    }

    #[test]
    fn tokens_are_required_per_mode() {
        assert!(resolve("", IngressMode::Event, &[], CliOverrides::default()).is_err());
        assert!(resolve("", IngressMode::Handshake, &[], CliOverrides::default()).is_ok());
        assert!(
            resolve(
                "",
                IngressMode::Stream,
                &[("SLACK_TOKEN", "xoxb-1")],
                CliOverrides::default()
            )
            .is_err()
        );
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let cfg = resolve(
            "[slack]\nbot_token = \"xoxb-file\"\n",
            IngressMode::Event,
            &[("SLACK_TOKEN", "  ")],
            CliOverrides::default(),
        )
        .expect("config");
        assert_eq!(cfg.slack.bot_token, "xoxb-file");
    }

    #[test]
    fn http_timeout_must_cover_a_full_evaluation() {
        let err = resolve(
            "[slack]\napi_timeout_seconds = 10\n[server]\nhttp_timeout_seconds = 30\n",
            IngressMode::Event,
            &[("SLACK_TOKEN", "xoxb-1")],
            CliOverrides::default(),
        )
        .expect_err("short http timeout");
        assert!(err.to_string().contains("server.http_timeout_seconds"));

        let cfg = resolve(
            "[slack]\napi_timeout_seconds = 10\n[server]\nhttp_timeout_seconds = 50\n",
            IngressMode::Event,
            &[("SLACK_TOKEN", "xoxb-1")],
            CliOverrides::default(),
        )
        .expect("timeout at the floor");
        assert_eq!(cfg.server.http_timeout_seconds, 50);

        let defaults = resolve("", IngressMode::Event, &[("SLACK_TOKEN", "xoxb-1")], CliOverrides::default())
            .expect("defaults");
        assert_eq!(defaults.server.http_timeout_seconds, 60);
    }
}
