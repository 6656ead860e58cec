use crate::server::routes::{health::health_handler, webhooks};
use crate::server::state::AppState;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Requests to webhook paths exceeding this are rejected with 413, per
/// `spec.md` §6.1.
const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST]);

    // Per-IP rate limiting at the ingress, independent of the per-user
    // sliding-window limiter the front-end integration calls separately.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .finish()
            .expect("rate limiter configuration is valid"),
    );

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/", get(health_handler))
        .route(
            "/webhook/telegram/{secret}",
            post(webhooks::telegram_webhook)
                .layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_BODY_BYTES)),
        )
        .route(
            "/yookassa/webhook/{secret}",
            post(webhooks::yookassa_webhook)
                .layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_BODY_BYTES)),
        )
        .layer(GovernorLayer { config: governor_config })
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
