//! Socket Mode runner.
//!
//! The socket task only decodes and acknowledges; each message is evaluated in
//! its own task so a slow evaluation never delays an ack.

use crate::config::RageConfig;
use crate::server::{build_service, shutdown_signal};
use anyhow::Result;
use rage_channels::{SocketModeClient, StreamEvent};
use rage_core::RageService;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const EVENT_QUEUE_CAPACITY: usize = 256;

pub async fn serve_stream(cfg: RageConfig) -> Result<()> {
    let service = build_service(&cfg)?;
    let client = SocketModeClient::new(&cfg.slack.app_token)?
        .with_api_base_url(&cfg.slack.api_base_url)?
        .with_timeout(cfg.api_timeout())?
        .with_reconnect_delay(cfg.reconnect_delay());

    let policy = service.policy();
    tracing::info!(
        threshold = policy.threshold,
        period_secs = policy.period.as_secs(),
        speakers = policy.min_speakers,
        notify_channel = %service.notifier().target(),
        reconnect_delay_ms = cfg.stream.reconnect_delay_ms,
        "starting socket mode stream"
    );

    let shutdown = CancellationToken::new();
    let signal_handle = tokio::spawn(shutdown_signal(shutdown.clone()));
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let dispatcher = tokio::spawn(dispatch_events(service, rx));
    let result = client.run(tx, shutdown.clone()).await;

    shutdown.cancel();
    signal_handle.abort();
    match dispatcher.await {
        Ok(handled) => tracing::info!(handled, "stream dispatcher shutdown completed"),
        Err(e) => tracing::error!(error = %e, "stream dispatcher join failed during shutdown"),
    }

    result.map_err(|e| anyhow::anyhow!("socket mode stream stopped: {e}"))
}

/// Drains the event queue until the sender is dropped, then waits for the
/// in-flight evaluations. Returns the number of messages evaluated.
async fn dispatch_events(service: Arc<RageService>, mut rx: mpsc::Receiver<StreamEvent>) -> usize {
    let mut tasks = JoinSet::new();
    let mut handled = 0usize;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Hello { connections } => {
                tracing::info!(?connections, "socket mode connected");
            }
            StreamEvent::Disconnect { reason } => {
                tracing::info!(%reason, "socket mode disconnect requested");
            }
            StreamEvent::Ignored { kind } => {
                tracing::debug!(%kind, "stream event ignored");
            }
            StreamEvent::Message(message) => {
                handled += 1;
                let service = service.clone();
                tasks.spawn(async move {
                    match service.handle_message(&message).await {
                        Ok(outcome) => tracing::info!(?outcome, "stream message handled"),
                        Err(error) => tracing::error!(%error, "stream message failed"),
                    }
                });
            }
        }
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "stream message task panicked");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "stream message task panicked");
        }
    }
    handled
}
