use crate::error::{PlatformError, Result};
use crate::events::{CallbackEvent, EventsApiPayload};
use crate::slack::{
    DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT, build_http_client, normalize_api_base_url,
    read_response,
};
use crate::types::Message;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Typed events produced by a Socket Mode connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Hello { connections: Option<u32> },
    Disconnect { reason: String },
    Message(Message),
    Ignored { kind: String },
}

/// Slack Socket Mode client authenticated with an app-level (`xapp-`) token.
#[derive(Clone)]
pub struct SocketModeClient {
    http: reqwest::Client,
    app_token: String,
    api_base_url: String,
    reconnect_delay: Duration,
}

enum SessionEnd {
    Shutdown,
    Reconnect,
}

impl SocketModeClient {
    pub fn new(app_token: &str) -> Result<Self> {
        let token = app_token.trim();
        if token.is_empty() {
            return Err(PlatformError::InvalidInput(
                "slack app token is required for socket mode".to_string(),
            ));
        }
        Ok(Self {
            http: build_http_client(DEFAULT_API_TIMEOUT)?,
            app_token: token.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    pub fn with_api_base_url(mut self, api_base_url: &str) -> Result<Self> {
        self.api_base_url = normalize_api_base_url(api_base_url)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http_client(timeout)?;
        Ok(self)
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    /// Requests a fresh websocket URL via `apps.connections.open`.
    pub async fn open_connection(&self) -> Result<Url> {
        let url = Url::parse(&format!("{}/apps.connections.open", self.api_base_url))
            .map_err(|e| PlatformError::InvalidInput(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.app_token)
            .send()
            .await?;
        let body: SlackConnectionsOpenResponse =
            read_response("apps.connections.open", response).await?;
        Url::parse(&body.url)
            .map_err(|e| PlatformError::ResponseFormat(format!("socket mode url: {e}")))
    }

    /// Drives the connection until shutdown, reconnecting after disconnects.
    ///
    /// Returns an error only for authentication failures or when the
    /// receiving side of `tx` is gone.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run(
        &self,
        tx: mpsc::Sender<StreamEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut failure_streak = 0u32;
        loop {
            let opened = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                opened = self.open_connection() => opened,
            };
            match opened {
                Ok(url) => match self.run_session(url, &tx, &shutdown).await {
                    Ok(SessionEnd::Shutdown) => return Ok(()),
                    Ok(SessionEnd::Reconnect) => {
                        failure_streak = 0;
                        tracing::info!("socket mode session ended; reconnecting");
                    }
                    Err(PlatformError::QueueClosed) => return Err(PlatformError::QueueClosed),
                    Err(error) => {
                        failure_streak = failure_streak.saturating_add(1);
                        tracing::warn!(%error, failure_streak, "socket mode session failed");
                    }
                },
                Err(error) if error.is_auth_failure() => {
                    tracing::error!(%error, "socket mode authentication failed");
                    return Err(error);
                }
                Err(error) => {
                    failure_streak = failure_streak.saturating_add(1);
                    tracing::warn!(%error, failure_streak, "socket mode connection open failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn run_session(
        &self,
        url: Url,
        tx: &mpsc::Sender<StreamEvent>,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd> {
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();
        tracing::info!("socket mode websocket connected");

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = source.next() => frame,
            };
            let Some(frame) = frame else {
                return Ok(SessionEnd::Reconnect);
            };
            let envelope = match parse_socket_envelope(frame?) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(%error, "dropping unparseable socket mode frame");
                    continue;
                }
            };

            if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
                sink.send(WsMessage::Text(ack.into())).await?;
            }

            let event = match stream_event_from_envelope(envelope) {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(%error, "dropping undecodable socket mode envelope");
                    continue;
                }
            };
            let disconnect = matches!(event, StreamEvent::Disconnect { .. });
            tx.send(event)
                .await
                .map_err(|_| PlatformError::QueueClosed)?;
            if disconnect {
                return Ok(SessionEnd::Reconnect);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlackConnectionsOpenResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    num_connections: Option<u32>,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    match message {
        WsMessage::Text(text) => Ok(Some(serde_json::from_str::<SocketEnvelope>(&text)?)),
        WsMessage::Binary(bytes) => Ok(Some(serde_json::from_slice::<SocketEnvelope>(&bytes)?)),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}

fn stream_event_from_envelope(
    envelope: SocketEnvelope,
) -> std::result::Result<StreamEvent, crate::error::DecodeError> {
    match envelope.kind.as_str() {
        "hello" => Ok(StreamEvent::Hello {
            connections: envelope.num_connections,
        }),
        "disconnect" => Ok(StreamEvent::Disconnect {
            reason: envelope.reason.unwrap_or_else(|| "unknown".to_string()),
        }),
        "events_api" => match EventsApiPayload::from_value(envelope.payload)? {
            EventsApiPayload::EventCallback {
                event: CallbackEvent::Message(message),
                ..
            } => Ok(StreamEvent::Message(message)),
            EventsApiPayload::EventCallback {
                event: CallbackEvent::Ignored { kind },
                ..
            } => Ok(StreamEvent::Ignored { kind }),
            EventsApiPayload::UrlVerification { .. } => Ok(StreamEvent::Ignored {
                kind: "url_verification".to_string(),
            }),
            EventsApiPayload::Other { kind } => Ok(StreamEvent::Ignored { kind }),
        },
        other => Ok(StreamEvent::Ignored {
            kind: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SocketEnvelope, SocketModeClient, StreamEvent, parse_socket_envelope,
        stream_event_from_envelope,
    };
    use httpmock::prelude::*;
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn envelope(value: serde_json::Value) -> SocketEnvelope {
        parse_socket_envelope(WsMessage::Text(value.to_string().into()))
            .expect("parse")
            .expect("envelope")
    }

    #[test]
    fn hello_and_disconnect_are_lifecycle_events() {
        let hello = envelope(json!({
            "type": "hello",
            "num_connections": 2,
            "connection_info": { "app_id": "A1" }
        }));
        assert!(hello.envelope_id.is_none());
        assert_eq!(
            stream_event_from_envelope(hello).expect("hello"),
            StreamEvent::Hello {
                connections: Some(2)
            }
        );

        let disconnect = envelope(json!({ "type": "disconnect", "reason": "refresh_requested" }));
        assert_eq!(
            stream_event_from_envelope(disconnect).expect("disconnect"),
            StreamEvent::Disconnect {
                reason: "refresh_requested".to_string()
            }
        );
    }

    #[test]
    fn events_api_message_becomes_message_event() {
        let frame = envelope(json!({
            "type": "events_api",
            "envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf",
            "accepts_response_payload": false,
            "payload": {
                "type": "event_callback",
                "event_id": "Ev1",
                "event": {
                    "type": "message",
                    "channel": "C1",
                    "user": "U1",
                    "ts": "1700000000.000100"
                }
            }
        }));
        assert_eq!(
            frame.envelope_id.as_deref(),
            Some("57d6a792-4d35-4d0b-b6aa-3361493e1caf")
        );
        let StreamEvent::Message(message) = stream_event_from_envelope(frame).expect("event")
        else {
            panic!("expected message event");
        };
        assert_eq!(message.channel_id.as_str(), "C1");
        assert_eq!(message.author_id.as_str(), "U1");
    }

    #[test]
    fn other_envelopes_are_ignored_and_control_frames_skipped() {
        let slash = envelope(json!({ "type": "slash_commands", "envelope_id": "e1", "payload": {} }));
        assert_eq!(
            stream_event_from_envelope(slash).expect("event"),
            StreamEvent::Ignored {
                kind: "slash_commands".to_string()
            }
        );
        assert!(
            parse_socket_envelope(WsMessage::Ping(Vec::new().into()))
                .expect("ping")
                .is_none()
        );
    }

    #[test]
    fn broken_events_api_payload_is_a_decode_error() {
        let frame = envelope(json!({
            "type": "events_api",
            "envelope_id": "e2",
            "payload": { "type": "event_callback", "event": null }
        }));
        assert!(stream_event_from_envelope(frame).is_err());
    }

    #[tokio::test]
    async fn open_connection_surfaces_auth_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/apps.connections.open")
                .header("authorization", "Bearer xapp-test");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "invalid_auth" }));
        });

        let client = SocketModeClient::new("xapp-test")
            .expect("client")
            .with_api_base_url(&server.base_url())
            .expect("base url");
        let error = client.open_connection().await.expect_err("must fail");
        assert!(error.is_auth_failure());
    }

    #[tokio::test]
    async fn run_terminates_on_auth_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/apps.connections.open");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "not_authed" }));
        });

        let client = SocketModeClient::new("xapp-test")
            .expect("client")
            .with_api_base_url(&server.base_url())
            .expect("base url");
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let error = client
            .run(tx, tokio_util::sync::CancellationToken::new())
            .await
            .expect_err("auth failure ends the loop");
        assert!(error.is_auth_failure());
    }
}
