use std::net::IpAddr;

use crate::error::{AppError, Result};
use crate::model::StatsResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::debug;

pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Service counters, for callers inside the trusted subnet only.
pub async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>> {
    let Some(subnet) = state.trusted_subnet() else {
        return Err(AppError::Forbidden);
    };

    let client = headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());

    match client {
        Some(ip) if subnet.contains(ip) => {}
        other => {
            debug!(client = ?other, %subnet, "stats request outside trusted subnet");
            return Err(AppError::Forbidden);
        }
    }

    let stats = state.shortener().stats().await?;
    Ok(Json(StatsResponse {
        urls: stats.urls,
        users: stats.users,
    }))
}
