use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shortlink_core::StorageError;
use shortlink_shortener::ShortenerError;
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid json")]
    InvalidJson(#[from] JsonRejection),
    #[error("not found")]
    NotFound,
    #[error("gone")]
    Gone,
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Storage(StorageError),
}

impl From<ShortenerError> for AppError {
    fn from(err: ShortenerError) -> Self {
        match err {
            ShortenerError::InvalidUrl(message) => AppError::BadRequest(message),
            ShortenerError::NotFound(_) => AppError::NotFound,
            ShortenerError::Storage(err) => AppError::Storage(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::InvalidJson(_) => (StatusCode::BAD_REQUEST, "invalid_json"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Gone => (StatusCode::GONE, "gone"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Storage(StorageError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            AppError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Storage(err @ (StorageError::Unavailable(_) | StorageError::Timeout(_))) => {
                warn!(error = %err, "storage unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            AppError::Storage(err) => {
                error!(error = %err, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        // Storage details stay in the logs.
        let message = match &self {
            AppError::Storage(_) => status
                .canonical_reason()
                .unwrap_or("internal error")
                .to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { code, error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::Gone, StatusCode::GONE),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (
                AppError::Storage(StorageError::Conflict("abc".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Storage(StorageError::Timeout("pool".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Storage(StorageError::Query("syntax".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn shortener_errors_map() {
        let err: AppError = ShortenerError::InvalidUrl("nope".into()).into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = ShortenerError::NotFound("abc".into()).into();
        assert!(matches!(err, AppError::NotFound));
    }
}
