use crate::auth::SessionToken;
use crate::error::{AppError, Result};
use crate::model::UserUrl;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

/// `GET /api/user/urls`: every URL the caller shortened.
pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    token: SessionToken,
) -> Result<Response> {
    if token.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let records = state.shortener().list(token.as_str()).await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<UserUrl> = records
        .into_iter()
        .map(|record| UserUrl {
            short_url: state.short_url(&record.short_code),
            original_url: record.original_url,
        })
        .collect();
    Ok(Json(body).into_response())
}

/// `DELETE /api/user/urls` with a JSON array of short code fragments.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    token: SessionToken,
    payload: std::result::Result<Json<Vec<String>>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(fragments) = payload?;

    if token.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }
    if fragments.is_empty() {
        return Err(AppError::BadRequest("no short urls given".to_string()));
    }

    let report = state.shortener().delete(fragments, token.as_str()).await?;
    info!(
        deleted = report.deleted.len(),
        unmatched = report.unmatched.len(),
        failed = report.failed.len(),
        "delete request done"
    );
    Ok(StatusCode::ACCEPTED)
}
