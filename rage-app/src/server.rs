//! Webhook server, doctor command and the shared wiring for both ingress modes.

use crate::config::RageConfig;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use rage_channels::{ChatPlatform, SlackClient};
use rage_core::{InboundDeduplicator, Notifier, RageService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// State shared by webhook handlers.
pub struct AppState {
    pub service: Arc<RageService>,
    pub dedup: InboundDeduplicator,
}

pub fn build_platform(cfg: &RageConfig) -> Result<Arc<dyn ChatPlatform>> {
    let client = SlackClient::new(&cfg.slack.bot_token)?
        .with_api_base_url(&cfg.slack.api_base_url)?
        .with_timeout(cfg.api_timeout())?;
    tracing::info!(
        platform = client.platform_id(),
        api_base_url = %cfg.slack.api_base_url,
        api_timeout_seconds = cfg.slack.api_timeout_seconds,
        "chat platform ready"
    );
    Ok(Arc::new(client))
}

pub fn build_notifier(cfg: &RageConfig, platform: Arc<dyn ChatPlatform>) -> Notifier {
    Notifier::new(platform, &cfg.notify.channel).with_template(&cfg.notify.template)
}

pub fn build_service(cfg: &RageConfig) -> Result<Arc<RageService>> {
    let platform = build_platform(cfg)?;
    let notifier = build_notifier(cfg, platform.clone());
    Ok(Arc::new(RageService::new(
        platform,
        cfg.detection_policy(),
        notifier,
    )))
}

/// Validates configuration and checks that the notify channel resolves.
pub async fn doctor(cfg: &RageConfig) -> Result<()> {
    let platform = build_platform(cfg)?;
    let notifier = build_notifier(cfg, platform);
    let target = notifier
        .resolve_target()
        .await
        .map_err(|e| anyhow::anyhow!("notify channel check failed: {e}"))?;
    tracing::info!(
        threshold = cfg.detection.threshold,
        period_secs = cfg.period().as_secs(),
        speakers = cfg.detection.speakers,
        notify_channel = %notifier.target(),
        notify_channel_id = %target,
        api_base_url = %cfg.slack.api_base_url,
        "config ok"
    );
    println!(
        "slack-rage doctor: ok (notify channel #{} is {target})",
        notifier.target()
    );
    Ok(())
}

pub async fn serve_events(cfg: RageConfig) -> Result<()> {
    let addr = cfg.bind_addr()?;
    let service = build_service(&cfg)?;
    let policy = service.policy();
    tracing::info!(
        threshold = policy.threshold,
        period_secs = policy.period.as_secs(),
        speakers = policy.min_speakers,
        notify_channel = %service.notifier().target(),
        bind_addr = %addr,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        "starting event api server"
    );

    let state = Arc::new(AppState {
        service,
        dedup: InboundDeduplicator::new(),
    });
    let app = with_http_layers(routes::router().layer(Extension(state)), &cfg);
    serve_http(addr, app).await
}

pub async fn serve_handshake(cfg: RageConfig) -> Result<()> {
    let addr = cfg.bind_addr()?;
    tracing::info!(bind_addr = %addr, "starting handshake server");
    let app = with_http_layers(routes::handshake_router(), &cfg);
    serve_http(addr, app).await
}

async fn serve_http(addr: SocketAddr, app: axum::Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind failed for {addr}: {e}"))?;
    let shutdown = CancellationToken::new();

    tracing::info!(%addr, "slack-rage serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

pub(crate) fn with_http_layers(router: axum::Router, cfg: &RageConfig) -> axum::Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::debug!(
                method = %request.method(),
                uri = %request.uri(),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    router
        .layer(GlobalConcurrencyLimitLayer::new(
            cfg.server.http_max_in_flight,
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

/// Resolves on ctrl-c or SIGTERM and cancels `shutdown`.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}
