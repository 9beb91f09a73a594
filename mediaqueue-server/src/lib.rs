//! Library surface for the `mediaqueue-server` binary, split out so
//! integration tests can build the axum app the same way `main` does
//! without driving the real `main()` entry point.

pub mod config;
pub mod health;
pub mod websocket;

use std::sync::Arc;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub peers: Arc<mediaqueue_core::broadcast::WebsocketPeers>,
}

/// Builds the axum app named in spec §6: a health check plus the
/// websocket upgrade, nothing else. Shared by `main` and by integration
/// tests that only need the HTTP surface, not the full set of spawned
/// background loops.
pub fn build_app(state: AppState) -> axum::Router {
    use axum::routing::get;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/healthz", get(health::check))
        .route("/ws", get(websocket::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
