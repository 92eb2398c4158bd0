//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{success, ApiContext, Success};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_ready: bool,
    pub version: &'static str,
}

/// `GET /api/health`: liveness plus a store round-trip.
pub async fn check(
    State(ctx): State<ApiContext>,
) -> Result<Json<Success<HealthResponse>>, ApiError> {
    let store_ready = ctx
        .with_db(|_, conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| ApiError::Internal(e.to_string()))
        })
        .await
        .is_ok();

    Ok(success(HealthResponse {
        status: if store_ready { "ok" } else { "degraded" },
        store_ready,
        version: crate::config::APP_VERSION,
    }))
}
