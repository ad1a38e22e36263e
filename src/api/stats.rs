use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use super::handlers::{AppState, ErrorResponse};
use crate::stats::{StatRow, StatsQuery};
use crate::storage::StorageError;

#[derive(Debug, Serialize)]
pub struct StatsQueryResponse {
    pub rows: Vec<StatRow>,
    /// Sum of `value` across the returned rows.
    pub total: i64,
}

/// Run a report query against the counter table
pub async fn query_stats(
    State(state): State<Arc<AppState>>,
    Json(query): Json<StatsQuery>,
) -> Result<Json<StatsQueryResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.stats.query(&query).await {
        Ok(rows) => {
            let total = rows.iter().map(|r| r.value).sum();
            Ok(Json(StatsQueryResponse { rows, total }))
        }
        Err(StorageError::InvalidQuery(reason)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: reason }),
        )),
        Err(e) => {
            tracing::error!(error = %e, "Stats query failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to query statistics".to_string(),
                }),
            ))
        }
    }
}
