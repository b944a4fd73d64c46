use arbor_core::{CardId, OwnerId};
use arbor_srs::{Candidate, SchedulingState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields needed to insert a freshly generated card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub owner_id: OwnerId,
    #[serde(default)]
    pub study_set_id: Option<i64>,
    pub name: String,
    pub content: String,
}

/// A persisted flashcard: content plus scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCard {
    pub id: CardId,
    pub owner_id: OwnerId,
    pub study_set_id: Option<i64>,
    pub name: String,
    pub content: String,
    pub suspended: bool,
    /// Bumped on every write; review updates are conditional on it.
    pub version: i64,
    #[serde(flatten)]
    pub state: SchedulingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate for StoredCard {
    fn card_id(&self) -> CardId {
        self.id
    }

    fn scheduling_state(&self) -> &SchedulingState {
        &self.state
    }
}

/// The two candidate sets a study queue is built from.
#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
    /// `suspended = false AND due_at <= now`.
    pub due: Vec<StoredCard>,
    /// `suspended = false AND repetition = 0`, minus anything already in `due`.
    pub new: Vec<StoredCard>,
}

/// One applied review, as written to `review_log`.
///
/// Holds the post-review state so a retried submission carrying the same
/// idempotency key can be answered without applying the update again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub card_id: CardId,
    pub owner_id: OwnerId,
    pub quality: u8,
    pub reviewed_at: DateTime<Utc>,
    pub state: SchedulingState,
    /// Card version after the review was applied.
    pub card_version: i64,
    pub idempotency_key: Option<String>,
}
