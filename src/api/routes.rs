use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/user/register", post(handlers::register))
        .route("/api/user/login", post(handlers::login))
        .route(
            "/api/user/orders",
            post(handlers::upload_order).get(handlers::get_orders),
        )
        .route("/api/user/balance", get(handlers::get_balance))
        .route("/api/user/balance/withdraw", post(handlers::withdraw))
        .route("/api/user/withdrawals", get(handlers::get_withdrawals))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
