use crate::model::HealthResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

/// Reports whether the storage backend answers.
pub async fn ping_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.shortener().ping().await {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse {
                status: "unavailable",
            }),
        )
    }
}
