//! Study queue endpoint: GET /api/flashcards/queue.
//!
//! Query: `ownerId` (required), `limit` (optional, defaults to
//! `queue.default_limit`), `studySetId` (optional).
//! Response: `{"cards": [...]}`, highest priority first.

use std::sync::Arc;

use arbor_core::{config::QueueConfig, OwnerId};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueParams {
    pub owner_id: Option<String>,
    pub limit: Option<i64>,
    pub study_set_id: Option<i64>,
}

/// GET /api/flashcards/queue
pub async fn queue_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueueParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::invalid("query", e.body_text()))?;

    let owner = params
        .owner_id
        .filter(|o| !o.trim().is_empty())
        .map(OwnerId::from)
        .ok_or_else(|| ApiError::invalid("ownerId", "is required"))?;
    let limit = resolve_limit(params.limit, &state.config.queue)?;

    let now = Utc::now();
    let pools = state.cards.candidate_pools(
        &owner,
        limit,
        state.config.queue.due_overfetch,
        now,
        params.study_set_id,
    )?;
    let cards = state.queue().build(pools.due, pools.new, limit, now)?;

    info!(owner_id = %owner, limit, served = cards.len(), "study queue served");
    Ok(Json(json!({ "cards": cards })))
}

fn resolve_limit(requested: Option<i64>, config: &QueueConfig) -> Result<usize, ApiError> {
    let Some(limit) = requested else {
        return Ok(config.default_limit);
    };
    if limit <= 0 {
        return Err(ApiError::invalid("limit", "must be a positive integer"));
    }
    match usize::try_from(limit) {
        Ok(limit) if limit <= config.max_limit => Ok(limit),
        _ => Err(ApiError::invalid(
            "limit",
            format!("must not exceed {}", config.max_limit),
        )),
    }
}
