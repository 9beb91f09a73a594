use axum::body::Body;
use axum::http::{Request, StatusCode};
use mediaqueue_core::broadcast::WebsocketPeers;
use mediaqueue_server::{build_app, AppState};
use sqlx::PgPool;
use tower::ServiceExt;

#[sqlx::test(migrations = "../mediaqueue-core/migrations")]
async fn healthz_reports_ok_when_the_pool_is_reachable(pool: PgPool) {
    let state = AppState {
        pool,
        peers: WebsocketPeers::new(),
    };
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../mediaqueue-core/migrations")]
async fn healthz_reports_unavailable_once_the_pool_is_closed(pool: PgPool) {
    pool.close().await;

    let state = AppState {
        pool,
        peers: WebsocketPeers::new(),
    };
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
