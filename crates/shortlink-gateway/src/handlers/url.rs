use crate::auth::SessionToken;
use crate::error::{AppError, Result};
use crate::model::{BatchRequestItem, BatchResponseItem, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use shortlink_shortener::{BatchItem, Destination, Shortened};

fn created_or_conflict(shortened: &Shortened) -> StatusCode {
    if shortened.already_exists {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    token: SessionToken,
    body: String,
) -> Result<Response> {
    let original_url = body.trim();
    if original_url.is_empty() {
        return Err(AppError::BadRequest("empty body".to_string()));
    }

    let shortened = state
        .shortener()
        .shorten(original_url, token.as_str())
        .await?;

    Ok((
        created_or_conflict(&shortened),
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.short_url(&shortened.code),
    )
        .into_response())
}

/// `POST /api/shorten` with `{"url": ...}`.
pub async fn shorten_json_handler(
    State(state): State<AppState>,
    token: SessionToken,
    payload: std::result::Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;

    let shortened = state
        .shortener()
        .shorten(request.url.trim(), token.as_str())
        .await?;

    let body = ShortenResponse {
        result: state.short_url(&shortened.code),
    };
    Ok((created_or_conflict(&shortened), Json(body)).into_response())
}

/// `POST /api/shorten/batch`.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    token: SessionToken,
    payload: std::result::Result<Json<Vec<BatchRequestItem>>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    if request.is_empty() {
        return Err(AppError::BadRequest("empty batch".to_string()));
    }

    let items = request
        .into_iter()
        .map(|item| BatchItem {
            correlation_id: item.correlation_id,
            original_url: item.original_url.trim().to_string(),
        })
        .collect();

    let shortened = state
        .shortener()
        .shorten_batch(items, token.as_str())
        .await?;

    let body: Vec<BatchResponseItem> = shortened
        .into_iter()
        .map(|(correlation_id, code)| BatchResponseItem {
            correlation_id,
            short_url: state.short_url(&code),
        })
        .collect();

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// `GET /{code}`: 307 to the target, 410 once deleted, 404 if unknown.
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Redirect> {
    match state.shortener().resolve(&code).await? {
        Destination::Active(url) => Ok(Redirect::temporary(&url)),
        Destination::Gone => Err(AppError::Gone),
    }
}
