//! Slack Events API webhook.

use crate::server::AppState;
use axum::Extension;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use rage_channels::{CallbackEvent, EventId, EventsApiPayload, Message};
use rage_core::{Admission, RageError};
use std::sync::Arc;
use tracing::Instrument;

pub fn router() -> axum::Router {
    axum::Router::new().route("/", post(receive_event))
}

pub fn handshake_router() -> axum::Router {
    axum::Router::new().route("/", post(receive_handshake))
}

/// Maps a pipeline failure onto the webhook response policy.
///
/// Platform failures abandon the evaluation but the delivery itself was
/// handled, so Slack gets a 200 and does not retry. A failed notification is
/// a server error.
pub fn status_for_error(error: &RageError) -> StatusCode {
    match error {
        RageError::Platform(_) => StatusCode::OK,
        RageError::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[tracing::instrument(level = "info", skip_all, fields(body_len = body.len()))]
async fn receive_event(Extension(state): Extension<Arc<AppState>>, body: Bytes) -> Response {
    let payload = match EventsApiPayload::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "rejecting undecodable event payload");
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    match payload {
        EventsApiPayload::UrlVerification { challenge } => challenge_response(challenge),
        EventsApiPayload::Other { kind } => {
            tracing::warn!(%kind, "unsupported event type");
            StatusCode::OK.into_response()
        }
        EventsApiPayload::EventCallback {
            event: CallbackEvent::Ignored { kind },
            ..
        } => {
            tracing::debug!(%kind, "event ignored");
            StatusCode::OK.into_response()
        }
        EventsApiPayload::EventCallback {
            event_id,
            event: CallbackEvent::Message(message),
        } => handle_message(&state, event_id, message).await,
    }
}

/// Runs the pipeline in its own task. The task owns the in-flight guard, so
/// a request dropped by the HTTP timeout or a client disconnect cannot cancel
/// a post halfway and skip recording the cooldown.
async fn handle_message(state: &AppState, event_id: Option<EventId>, message: Message) -> Response {
    let in_flight = match event_id.as_ref().map(|id| state.dedup.admit(id)) {
        Some(Admission::Admitted(guard)) => Some(guard),
        Some(Admission::AlreadyInFlight) => {
            tracing::info!(event_id = ?event_id, "duplicate delivery already in flight");
            return StatusCode::OK.into_response();
        }
        None => None,
    };

    let service = state.service.clone();
    let evaluation = tokio::spawn(
        async move {
            let _in_flight = in_flight;
            service.handle_message(&message).await
        }
        .instrument(tracing::Span::current()),
    );
    let result = match evaluation.await {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(event_id = ?event_id, %error, "evaluation task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match result {
        Ok(outcome) => {
            tracing::info!(event_id = ?event_id, ?outcome, "event handled");
            StatusCode::OK.into_response()
        }
        Err(error) => {
            let status = status_for_error(&error);
            if status.is_server_error() {
                tracing::error!(event_id = ?event_id, %error, "notification failed");
                (status, error.to_string()).into_response()
            } else {
                tracing::warn!(event_id = ?event_id, %error, "evaluation abandoned");
                status.into_response()
            }
        }
    }
}

#[tracing::instrument(level = "info", skip_all, fields(body_len = body.len()))]
async fn receive_handshake(body: Bytes) -> Response {
    match EventsApiPayload::from_slice(&body) {
        Ok(EventsApiPayload::UrlVerification { challenge }) => challenge_response(challenge),
        Ok(_) => StatusCode::OK.into_response(),
        Err(error) => {
            tracing::warn!(%error, "rejecting undecodable event payload");
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
    }
}

fn challenge_response(challenge: String) -> Response {
    tracing::info!("answering url verification");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        challenge,
    )
        .into_response()
}
