//! Flashcard CRUD plus the interval preview shown on rating buttons.

use std::sync::Arc;

use arbor_cards::{NewCard, ReviewRecord, StoredCard};
use arbor_core::CardId;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::app::AppState;
use crate::error::ApiError;

const DEFAULT_HISTORY_LIMIT: usize = 50;

fn card_id(path: Result<Path<i64>, PathRejection>) -> Result<CardId, ApiError> {
    path.map(|Path(id)| CardId(id))
        .map_err(|e| ApiError::invalid("id", e.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::invalid("body", e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(v)| v)
        .map_err(|e| ApiError::invalid("query", e.body_text()))
}

/// POST /api/flashcards: new cards start unreviewed and due immediately.
pub async fn create_card(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewCard>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredCard>), ApiError> {
    let card = state.cards.create(&json_body(body)?, Utc::now())?;
    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /api/flashcards/{id}
pub async fn get_card(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<StoredCard>, ApiError> {
    Ok(Json(state.cards.get(card_id(path)?)?))
}

#[derive(Debug, Deserialize)]
pub struct ContentEdit {
    pub name: Option<String>,
    pub content: Option<String>,
}

/// PUT /api/flashcards/{id}: edits text only; scheduling is untouched.
pub async fn update_card(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ContentEdit>, JsonRejection>,
) -> Result<Json<StoredCard>, ApiError> {
    let id = card_id(path)?;
    let edit = json_body(body)?;
    let card = state.cards.update_content(
        id,
        edit.name.as_deref(),
        edit.content.as_deref(),
        Utc::now(),
    )?;
    Ok(Json(card))
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub suspended: bool,
}

/// PATCH /api/flashcards/{id}/suspend
pub async fn suspend_card(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<SuspendRequest>, JsonRejection>,
) -> Result<Json<StoredCard>, ApiError> {
    let id = card_id(path)?;
    let req = json_body(body)?;
    Ok(Json(state.cards.set_suspended(id, req.suspended, Utc::now())?))
}

/// DELETE /api/flashcards/{id}
pub async fn delete_card(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    state.cards.delete(card_id(path)?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    /// Hypothetical review time; defaults to now.
    pub at: Option<DateTime<Utc>>,
}

/// GET /api/flashcards/{id}/preview: interval each quality would produce.
pub async fn preview_card(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    params: Result<Query<PreviewParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = card_id(path)?;
    let at = query(params)?.at.unwrap_or_else(Utc::now);
    let card = state.cards.get(id)?;
    let intervals: Map<String, Value> = state
        .scheduler
        .preview(&card.state, at)?
        .iter()
        .enumerate()
        .map(|(quality, days)| (quality.to_string(), json!(days)))
        .collect();
    Ok(Json(json!({ "id": id, "intervals": intervals })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// GET /api/flashcards/{id}/reviews: newest first.
pub async fn card_reviews(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = card_id(path)?;
    let limit = query(params)?
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(state.config.queue.max_limit);
    // 404 for unknown cards rather than an empty history
    state.cards.get(id)?;
    let reviews: Vec<ReviewRecord> = state.cards.reviews_for_card(id, limit)?;
    Ok(Json(json!({ "id": id, "reviews": reviews })))
}
