use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::session_cookie;
use crate::handlers::{
    delete_user_urls_handler, list_user_urls_handler, ping_handler, redirect_handler,
    shorten_batch_handler, shorten_json_handler, shorten_text_handler, stats_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    /// Builds the router with every route and layer.
    ///
    /// Requests running past `request_timeout` are cut off with 408; the
    /// handler future is dropped, so an open database transaction rolls back.
    pub fn router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/", post(shorten_text_handler))
            .route("/ping", get(ping_handler))
            .route("/{code}", get(redirect_handler))
            .nest(
                "/api",
                Router::new()
                    .route("/shorten", post(shorten_json_handler))
                    .route("/shorten/batch", post(shorten_batch_handler))
                    .route(
                        "/user/urls",
                        get(list_user_urls_handler).delete(delete_user_urls_handler),
                    )
                    .route("/internal/stats", get(stats_handler)),
            )
            .layer(middleware::from_fn_with_state(state.clone(), session_cookie))
            .layer(RequestDecompressionLayer::new())
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                request_timeout,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
