//! Review submission: POST /api/flashcards/review.
//!
//! Request:  `{"cardId": 1, "quality": 4, "reviewTime"?: "...", "ownerId"?: "...",
//!            "expectedVersion"?: 3, "idempotencyKey"?: "..."}`
//! Response: the card's new scheduling fields plus its new `version`.
//!
//! A request carrying an `idempotencyKey` that was already applied gets the
//! stored result back and changes nothing, so clients can retry freely.

use std::sync::Arc;

use arbor_cards::{CardStoreError, ReviewRecord, StoredCard};
use arbor_core::{ArborError, CardId, OwnerId};
use arbor_srs::{Quality, Scheduler};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub card_id: i64,
    /// Range-checked after parsing so the error names the field.
    pub quality: i64,
    pub review_time: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub expected_version: Option<i64>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: CardId,
    pub repetition: u32,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub lapses: u32,
    pub version: i64,
}

impl From<&StoredCard> for ReviewResponse {
    fn from(card: &StoredCard) -> Self {
        Self {
            id: card.id,
            repetition: card.state.repetition,
            interval_days: card.state.interval_days,
            ease_factor: card.state.ease_factor,
            due_at: card.state.due_at,
            last_reviewed_at: card.state.last_reviewed_at,
            lapses: card.state.lapses,
            version: card.version,
        }
    }
}

impl From<&ReviewRecord> for ReviewResponse {
    fn from(record: &ReviewRecord) -> Self {
        Self {
            id: record.card_id,
            repetition: record.state.repetition,
            interval_days: record.state.interval_days,
            ease_factor: record.state.ease_factor,
            due_at: record.state.due_at,
            last_reviewed_at: Some(record.reviewed_at),
            lapses: record.state.lapses,
            version: record.card_version,
        }
    }
}

/// POST /api/flashcards/review
pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let Json(req) = body.map_err(|e| {
        warn!(error = %e, "malformed review request");
        ApiError::invalid("body", e.body_text())
    })?;

    if req.card_id <= 0 {
        return Err(ApiError::invalid("cardId", "must be a positive integer"));
    }
    let id = CardId(req.card_id);
    let quality = Quality::try_from(req.quality)?;
    let owner = req.owner_id.map(OwnerId::from);
    let key = match req.idempotency_key.as_deref() {
        Some(k) if k.trim().is_empty() => {
            return Err(ApiError::invalid("idempotencyKey", "must not be empty"))
        }
        other => other,
    };

    if let Some(key) = key {
        if let Some(record) = state.cards.find_review(key)? {
            return replay(&record, id, owner.as_ref());
        }
    }

    let card = state.cards.get(id)?;
    if owner.as_ref().is_some_and(|o| *o != card.owner_id) {
        // same answer as a missing card, so ids of other owners don't leak
        return Err(not_found(id));
    }
    if let Some(expected) = req.expected_version {
        if expected != card.version {
            warn!(card_id = %id, expected, actual = card.version, "review against stale version");
            return Err(ArborError::Conflict { id: id.to_string() }.into());
        }
    }

    let review_time = req.review_time.unwrap_or_else(Utc::now);
    let next = state.scheduler.update(&card.state, quality, review_time)?;

    match state
        .cards
        .apply_review(id, card.version, &next, quality.value(), key)
    {
        Ok((updated, _)) => {
            info!(
                card_id = %id,
                quality = quality.value(),
                interval_days = updated.state.interval_days,
                version = updated.version,
                "review applied"
            );
            Ok(Json(ReviewResponse::from(&updated)))
        }
        // a concurrent retry with the same key committed first
        Err(CardStoreError::DuplicateReview { key }) => match state.cards.find_review(&key)? {
            Some(record) => replay(&record, id, owner.as_ref()),
            None => Err(ArborError::Internal(format!("review {key} vanished after commit")).into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// Answer a retried request from the stored review.
fn replay(
    record: &ReviewRecord,
    id: CardId,
    owner: Option<&OwnerId>,
) -> Result<Json<ReviewResponse>, ApiError> {
    if record.card_id != id {
        return Err(ApiError::invalid(
            "idempotencyKey",
            format!("already used for card {}", record.card_id),
        ));
    }
    if owner.is_some_and(|o| *o != record.owner_id) {
        return Err(not_found(id));
    }
    info!(card_id = %id, version = record.card_version, "review replayed from idempotency key");
    Ok(Json(ReviewResponse::from(record)))
}

fn not_found(id: CardId) -> ApiError {
    ArborError::NotFound {
        what: "card".into(),
        id: id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use crate::app::test_support::{add_card, json, send, state};
    use axum::http::StatusCode;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    const URI: &str = "/api/flashcards/review";

    fn body(card_id: i64, quality: i64, extra: &str) -> String {
        format!(
            r#"{{"cardId": {card_id}, "quality": {quality}, "reviewTime": "2024-01-10T08:00:00Z"{extra}}}"#
        )
    }

    fn created() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_success_schedules_one_day() {
        let s = state();
        let card = add_card(&s, "u-1", "osmosis", created());
        let (status, v) = send(&s, json("POST", URI, &body(card.id.get(), 4, ""))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["id"], card.id.get());
        assert_eq!(v["repetition"], 1);
        assert_eq!(v["intervalDays"], 1);
        assert_eq!(v["easeFactor"], 2.5);
        assert_eq!(v["lapses"], 0);
        assert_eq!(v["version"], 1);
        assert_eq!(v["dueAt"], "2024-01-11T08:00:00Z");
        assert_eq!(v["lastReviewedAt"], "2024-01-10T08:00:00Z");
    }

    #[tokio::test]
    async fn lapse_resets_streak_and_counts() {
        let s = state();
        let card = add_card(&s, "u-1", "meiosis", created());
        let id = card.id.get();
        send(&s, json("POST", URI, &body(id, 5, ""))).await;
        let (_, v) = send(&s, json("POST", URI, &body(id, 4, ""))).await;
        assert_eq!(v["intervalDays"], 6);

        let (status, v) = send(&s, json("POST", URI, &body(id, 1, ""))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["repetition"], 0);
        assert_eq!(v["intervalDays"], 1);
        assert_eq!(v["lapses"], 1);
        assert_eq!(v["version"], 3);
    }

    #[tokio::test]
    async fn out_of_range_quality_names_the_field() {
        let s = state();
        let card = add_card(&s, "u-1", "enzyme", created());
        for q in [-1, 6] {
            let (status, v) = send(&s, json("POST", URI, &body(card.id.get(), q, ""))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(v["field"], "quality");
        }
        assert_eq!(s.cards.get(card.id).unwrap().version, 0);
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected_before_scheduling() {
        let s = state();
        let card = add_card(&s, "u-1", "ribosome", created());
        let bad = [
            r#"{"cardId": 1}"#.to_string(),
            r#"{"quality": 4}"#.to_string(),
            r#"{"cardId": "one", "quality": 4}"#.to_string(),
            format!(r#"{{"cardId": {}, "quality": 3.5}}"#, card.id.get()),
            "not json".to_string(),
        ];
        for b in bad {
            let (status, v) = send(&s, json("POST", URI, &b)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{b}");
            assert_eq!(v["code"], "INVALID_INPUT");
        }
        assert_eq!(s.cards.get(card.id).unwrap().version, 0);
    }

    #[tokio::test]
    async fn non_positive_card_id_is_invalid() {
        let s = state();
        for id in [0, -5] {
            let (status, v) = send(&s, json("POST", URI, &body(id, 4, ""))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "cardId={id}");
            assert_eq!(v["field"], "cardId");
        }
    }

    #[tokio::test]
    async fn due_date_past_year_9999_is_a_bad_request() {
        let s = state();
        let card = add_card(&s, "u-1", "centriole", created());
        let id = card.id.get();
        let late = |q: i64| {
            format!(r#"{{"cardId": {id}, "quality": {q}, "reviewTime": "9999-12-30T00:00:00Z"}}"#)
        };
        let (status, v) = send(&s, json("POST", URI, &late(4))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["dueAt"], "9999-12-31T00:00:00Z");

        // six more days would leave the four-digit year range
        let (status, v) = send(&s, json("POST", URI, &late(4))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["field"], "reviewTime");

        let (status, v) = send(&s, json("POST", URI, &late(1))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["lapses"], 1);
        assert_eq!(s.cards.get(card.id).unwrap().version, 2);
    }

    #[tokio::test]
    async fn unknown_or_foreign_card_is_not_found() {
        let s = state();
        let card = add_card(&s, "u-1", "golgi", created());
        let (status, _) = send(&s, json("POST", URI, &body(999, 4, ""))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &s,
            json("POST", URI, &body(card.id.get(), 4, r#", "ownerId": "u-2""#)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(s.cards.get(card.id).unwrap().version, 0);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let s = state();
        let card = add_card(&s, "u-1", "vacuole", created());
        let id = card.id.get();
        let (status, _) = send(&s, json("POST", URI, &body(id, 4, r#", "expectedVersion": 0"#))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, v) = send(&s, json("POST", URI, &body(id, 2, r#", "expectedVersion": 0"#))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(v["code"], "CONFLICT");
        assert_eq!(s.cards.get(card.id).unwrap().state.lapses, 0);
    }

    #[tokio::test]
    async fn retry_with_same_key_applies_once() {
        let s = state();
        let card = add_card(&s, "u-1", "lysosome", created());
        let req = body(card.id.get(), 5, r#", "idempotencyKey": "sess-1/42""#);

        let (first_status, first) = send(&s, json("POST", URI, &req)).await;
        let (second_status, second) = send(&s, json("POST", URI, &req)).await;
        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(first, second);

        let stored = s.cards.get(card.id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.state.repetition, 1);
        assert_eq!(s.cards.reviews_for_card(card.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn key_reused_for_another_card_is_rejected() {
        let s = state();
        let a = add_card(&s, "u-1", "a", created());
        let b = add_card(&s, "u-1", "b", created());
        let extra = r#", "idempotencyKey": "k""#;
        send(&s, json("POST", URI, &body(a.id.get(), 4, extra))).await;
        let (status, v): (_, Value) = send(&s, json("POST", URI, &body(b.id.get(), 4, extra))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["field"], "idempotencyKey");
    }
}
