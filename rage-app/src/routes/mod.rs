pub mod events;
pub mod health;

use axum::Router;

/// Full webhook surface: event ingress plus health check.
pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(events::router())
}

/// Answers the URL verification handshake and acknowledges everything else.
pub fn handshake_router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(events::handshake_router())
}
