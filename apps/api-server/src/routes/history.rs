use super::types::{CaptionItem, HistoryResponse};
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<String>,
}

/// Most recent captions first. A missing or unparsable `limit` falls back to
/// the configured default.
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params
        .limit
        .as_deref()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(state.history_default_limit);

    let library = Arc::clone(&state.library);
    let records = tokio::task::spawn_blocking(move || library.recent(limit))
        .await
        .map_err(|e| ApiError::Internal(format!("history task failed: {e}")))??;

    Ok(Json(HistoryResponse {
        items: records.into_iter().map(CaptionItem::from).collect(),
    }))
}
