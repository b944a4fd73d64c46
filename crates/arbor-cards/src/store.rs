use std::sync::{Mutex, MutexGuard, PoisonError};

use arbor_core::types::{format_ts, is_storable, parse_ts};
use arbor_core::{CardId, OwnerId};
use arbor_srs::SchedulingState;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::error::{CardStoreError, Result};
use crate::types::{CandidatePools, NewCard, ReviewRecord, StoredCard};

const CARD_COLUMNS: &str = "id, owner_id, study_set_id, name, content, repetition, interval_days,
     ease_factor, lapses, due_at, last_reviewed_at, suspended, version, created_at, updated_at";

const REVIEW_COLUMNS: &str = "card_id, owner_id, quality, reviewed_at, repetition, interval_days,
     ease_factor, lapses, due_at, card_version, idempotency_key";

/// Thread-safe flashcard store.
///
/// Wraps a single SQLite connection in a `Mutex`, like the other per-subsystem
/// managers. Reads of both candidate pools happen under one lock so they see
/// the same snapshot.
pub struct CardStore {
    db: Mutex<Connection>,
}

impl CardStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a card in the never-reviewed state, due immediately.
    #[instrument(skip(self, card), fields(owner_id = %card.owner_id))]
    pub fn create(&self, card: &NewCard, now: DateTime<Utc>) -> Result<StoredCard> {
        if card.owner_id.as_str().is_empty() {
            return Err(CardStoreError::InvalidInput("ownerId must not be empty".into()));
        }
        if card.name.trim().is_empty() || card.content.trim().is_empty() {
            return Err(CardStoreError::InvalidInput(
                "name and content must not be empty".into(),
            ));
        }

        if !is_storable(now) {
            return Err(CardStoreError::InvalidInput(format!("{now} is outside the storable range")));
        }
        let initial = SchedulingState::new_card(now);
        let now_str = format_ts(now);
        let db = self.lock();
        db.execute(
            "INSERT INTO flashcards
             (owner_id, study_set_id, name, content, repetition, interval_days, ease_factor,
              lapses, due_at, last_reviewed_at, suspended, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 0, 0, ?9, ?9)",
            params![
                card.owner_id.as_str(),
                card.study_set_id,
                card.name,
                card.content,
                initial.repetition,
                initial.interval_days,
                initial.ease_factor,
                initial.lapses,
                now_str,
            ],
        )?;
        let id = CardId(db.last_insert_rowid());
        info!(card_id = %id, "card created");
        select_card(&db, id)
    }

    /// Fetch a single card by id.
    #[instrument(skip(self))]
    pub fn get(&self, id: CardId) -> Result<StoredCard> {
        select_card(&self.lock(), id)
    }

    /// Load both candidate pools for one queue request.
    ///
    /// The due pool is over-fetched (`limit * overfetch`) so ranking has room
    /// to work. New cards are only read when the due pool cannot fill the
    /// batch on its own, and then only as many as are missing.
    #[instrument(skip(self, owner), fields(owner_id = %owner))]
    pub fn candidate_pools(
        &self,
        owner: &OwnerId,
        limit: usize,
        overfetch: usize,
        now: DateTime<Utc>,
        study_set: Option<i64>,
    ) -> Result<CandidatePools> {
        let db = self.lock();
        let due = select_due(&db, owner, now, limit.saturating_mul(overfetch.max(1)), study_set)?;
        let new = if due.len() < limit {
            let due_ids: Vec<CardId> = due.iter().map(|c| c.id).collect();
            select_new(&db, owner, &due_ids, limit - due.len(), study_set)?
        } else {
            Vec::new()
        };
        debug!(due = due.len(), new = new.len(), "candidate pools loaded");
        Ok(CandidatePools { due, new })
    }

    /// Persist a review result computed from the card at `expected_version`.
    ///
    /// The update and its `review_log` row are written in one transaction.
    /// Fails with `Conflict` if the card changed since it was read, and with
    /// `DuplicateReview` if `idempotency_key` was already used.
    #[instrument(skip(self, state, idempotency_key), fields(card_id = %id))]
    pub fn apply_review(
        &self,
        id: CardId,
        expected_version: i64,
        state: &SchedulingState,
        quality: u8,
        idempotency_key: Option<&str>,
    ) -> Result<(StoredCard, ReviewRecord)> {
        let reviewed_at = state.last_reviewed_at.ok_or_else(|| {
            CardStoreError::InvalidInput("reviewed state carries no review time".into())
        })?;
        if !is_storable(reviewed_at) || !is_storable(state.due_at) {
            return Err(CardStoreError::InvalidInput(format!(
                "due date {} is outside the storable range",
                state.due_at
            )));
        }
        let reviewed_str = format_ts(reviewed_at);

        let mut db = self.lock();
        let tx = db.transaction()?;
        let changed = tx.execute(
            "UPDATE flashcards
             SET repetition = ?1, interval_days = ?2, ease_factor = ?3, lapses = ?4,
                 due_at = ?5, last_reviewed_at = ?6, version = version + 1, updated_at = ?6
             WHERE id = ?7 AND version = ?8",
            params![
                state.repetition,
                state.interval_days,
                state.ease_factor,
                state.lapses,
                format_ts(state.due_at),
                reviewed_str,
                id.get(),
                expected_version,
            ],
        )?;
        if changed == 0 {
            // a same-key retry that lost the race sees the winner's row here
            if let Some(key) = idempotency_key {
                let recorded: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM review_log WHERE idempotency_key = ?1)",
                    params![key],
                    |row| row.get(0),
                )?;
                if recorded {
                    return Err(CardStoreError::DuplicateReview {
                        key: key.to_string(),
                    });
                }
            }
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM flashcards WHERE id = ?1)",
                params![id.get()],
                |row| row.get(0),
            )?;
            return Err(if exists {
                warn!(card_id = %id, expected_version, "stale review snapshot rejected");
                CardStoreError::Conflict {
                    id,
                    expected_version,
                }
            } else {
                CardStoreError::NotFound { id }
            });
        }

        let card = select_card(&tx, id)?;
        tx.execute(
            "INSERT INTO review_log
             (card_id, owner_id, quality, reviewed_at, repetition, interval_days, ease_factor,
              lapses, due_at, card_version, idempotency_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.get(),
                card.owner_id.as_str(),
                quality,
                reviewed_str,
                state.repetition,
                state.interval_days,
                state.ease_factor,
                state.lapses,
                format_ts(state.due_at),
                card.version,
                idempotency_key,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                CardStoreError::DuplicateReview {
                    key: idempotency_key.unwrap_or_default().to_string(),
                }
            }
            other => other.into(),
        })?;
        tx.commit()?;

        info!(
            card_id = %id,
            version = card.version,
            interval_days = state.interval_days,
            "review persisted"
        );
        let record = ReviewRecord {
            card_id: id,
            owner_id: card.owner_id.clone(),
            quality,
            reviewed_at,
            state: card.state.clone(),
            card_version: card.version,
            idempotency_key: idempotency_key.map(String::from),
        };
        Ok((card, record))
    }

    /// Look up a previously applied review by its idempotency key.
    #[instrument(skip(self))]
    pub fn find_review(&self, idempotency_key: &str) -> Result<Option<ReviewRecord>> {
        let db = self.lock();
        let row = db
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM review_log WHERE idempotency_key = ?1"),
                params![idempotency_key],
                ReviewRow::from_row,
            )
            .optional()?;
        row.map(ReviewRow::into_record).transpose()
    }

    /// Review history of one card, most recent first.
    #[instrument(skip(self))]
    pub fn reviews_for_card(&self, id: CardId, limit: usize) -> Result<Vec<ReviewRecord>> {
        let db = self.lock();
        let mut stmt = db.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_log
             WHERE card_id = ?1 ORDER BY reviewed_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![id.get(), limit as i64], ReviewRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ReviewRow::into_record).collect()
    }

    /// Exclude or re-include a card in queue construction.
    #[instrument(skip(self))]
    pub fn set_suspended(&self, id: CardId, suspended: bool, now: DateTime<Utc>) -> Result<StoredCard> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE flashcards SET suspended = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3",
            params![suspended, format_ts(now), id.get()],
        )?;
        if changed == 0 {
            return Err(CardStoreError::NotFound { id });
        }
        info!(card_id = %id, suspended, "card suspension changed");
        select_card(&db, id)
    }

    /// Edit a card's text. Scheduling fields are untouched.
    #[instrument(skip(self, name, content))]
    pub fn update_content(
        &self,
        id: CardId,
        name: Option<&str>,
        content: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StoredCard> {
        if name.is_none() && content.is_none() {
            return Err(CardStoreError::InvalidInput(
                "nothing to update: pass name or content".into(),
            ));
        }
        if name.is_some_and(|n| n.trim().is_empty()) || content.is_some_and(|c| c.trim().is_empty()) {
            return Err(CardStoreError::InvalidInput(
                "name and content must not be empty".into(),
            ));
        }

        let db = self.lock();
        let changed = db.execute(
            "UPDATE flashcards
             SET name = COALESCE(?1, name), content = COALESCE(?2, content),
                 version = version + 1, updated_at = ?3
             WHERE id = ?4",
            params![name, content, format_ts(now), id.get()],
        )?;
        if changed == 0 {
            return Err(CardStoreError::NotFound { id });
        }
        select_card(&db, id)
    }

    /// Permanently delete a card together with its review history.
    #[instrument(skip(self))]
    pub fn delete(&self, id: CardId) -> Result<()> {
        let mut db = self.lock();
        let tx = db.transaction()?;
        let changed = tx.execute("DELETE FROM flashcards WHERE id = ?1", params![id.get()])?;
        if changed == 0 {
            return Err(CardStoreError::NotFound { id });
        }
        tx.execute("DELETE FROM review_log WHERE card_id = ?1", params![id.get()])?;
        tx.commit()?;
        info!(card_id = %id, "card deleted");
        Ok(())
    }
}

// --- queries -----------------------------------------------------------------

fn select_card(conn: &Connection, id: CardId) -> Result<StoredCard> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE id = ?1"),
        params![id.get()],
        CardRow::from_row,
    )
    .optional()?
    .ok_or(CardStoreError::NotFound { id })?
    .into_card()
}

/// Unsuspended cards with `due_at <= now`, oldest due first.
fn select_due(
    conn: &Connection,
    owner: &OwnerId,
    now: DateTime<Utc>,
    take: usize,
    study_set: Option<i64>,
) -> Result<Vec<StoredCard>> {
    query_cards(
        conn,
        &format!(
            "SELECT {CARD_COLUMNS} FROM flashcards
             WHERE owner_id = ?1 AND suspended = 0 AND due_at <= ?2
               AND (?3 IS NULL OR study_set_id = ?3)
             ORDER BY due_at, id
             LIMIT ?4"
        ),
        params![owner.as_str(), format_ts(now), study_set, take as i64],
    )
}

/// Unsuspended never-reviewed cards, skipping `exclude`.
fn select_new(
    conn: &Connection,
    owner: &OwnerId,
    exclude: &[CardId],
    take: usize,
    study_set: Option<i64>,
) -> Result<Vec<StoredCard>> {
    // At most `exclude.len()` rows are dropped below, so over-read by that much.
    let cards = query_cards(
        conn,
        &format!(
            "SELECT {CARD_COLUMNS} FROM flashcards
             WHERE owner_id = ?1 AND suspended = 0 AND repetition = 0
               AND (?2 IS NULL OR study_set_id = ?2)
             ORDER BY created_at, id
             LIMIT ?3"
        ),
        params![
            owner.as_str(),
            study_set,
            take.saturating_add(exclude.len()) as i64
        ],
    )?;
    Ok(cards
        .into_iter()
        .filter(|c| !exclude.contains(&c.id))
        .take(take)
        .collect())
}

fn query_cards(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<StoredCard>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, CardRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(CardRow::into_card).collect()
}

// --- row mapping ---------------------------------------------------------------

/// Raw `flashcards` row before invariant checks.
struct CardRow {
    id: i64,
    owner_id: String,
    study_set_id: Option<i64>,
    name: String,
    content: String,
    repetition: i64,
    interval_days: i64,
    ease_factor: f64,
    lapses: i64,
    due_at: String,
    last_reviewed_at: Option<String>,
    suspended: bool,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl CardRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            study_set_id: row.get(2)?,
            name: row.get(3)?,
            content: row.get(4)?,
            repetition: row.get(5)?,
            interval_days: row.get(6)?,
            ease_factor: row.get(7)?,
            lapses: row.get(8)?,
            due_at: row.get(9)?,
            last_reviewed_at: row.get(10)?,
            suspended: row.get(11)?,
            version: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    /// Convert to a typed card, refusing rows no engine write could produce.
    fn into_card(self) -> Result<StoredCard> {
        let id = CardId(self.id);
        let state = SchedulingState {
            repetition: counter(id, "repetition", self.repetition)?,
            interval_days: counter(id, "interval_days", self.interval_days)?,
            ease_factor: self.ease_factor,
            lapses: counter(id, "lapses", self.lapses)?,
            due_at: timestamp(id, "due_at", &self.due_at)?,
            last_reviewed_at: self
                .last_reviewed_at
                .as_deref()
                .map(|s| timestamp(id, "last_reviewed_at", s))
                .transpose()?,
        };
        state
            .validate()
            .map_err(|e| CardStoreError::InternalInconsistency(format!("card {id}: {e}")))?;

        Ok(StoredCard {
            id,
            owner_id: OwnerId(self.owner_id),
            study_set_id: self.study_set_id,
            name: self.name,
            content: self.content,
            suspended: self.suspended,
            version: self.version,
            state,
            created_at: timestamp(id, "created_at", &self.created_at)?,
            updated_at: timestamp(id, "updated_at", &self.updated_at)?,
        })
    }
}

/// Raw `review_log` row.
struct ReviewRow {
    card_id: i64,
    owner_id: String,
    quality: i64,
    reviewed_at: String,
    repetition: i64,
    interval_days: i64,
    ease_factor: f64,
    lapses: i64,
    due_at: String,
    card_version: i64,
    idempotency_key: Option<String>,
}

impl ReviewRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            card_id: row.get(0)?,
            owner_id: row.get(1)?,
            quality: row.get(2)?,
            reviewed_at: row.get(3)?,
            repetition: row.get(4)?,
            interval_days: row.get(5)?,
            ease_factor: row.get(6)?,
            lapses: row.get(7)?,
            due_at: row.get(8)?,
            card_version: row.get(9)?,
            idempotency_key: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<ReviewRecord> {
        let id = CardId(self.card_id);
        let quality = u8::try_from(self.quality).map_err(|_| {
            CardStoreError::InternalInconsistency(format!(
                "review of card {id} has quality {}",
                self.quality
            ))
        })?;
        let reviewed_at = timestamp(id, "reviewed_at", &self.reviewed_at)?;
        Ok(ReviewRecord {
            card_id: id,
            owner_id: OwnerId(self.owner_id),
            quality,
            reviewed_at,
            state: SchedulingState {
                repetition: counter(id, "repetition", self.repetition)?,
                interval_days: counter(id, "interval_days", self.interval_days)?,
                ease_factor: self.ease_factor,
                lapses: counter(id, "lapses", self.lapses)?,
                due_at: timestamp(id, "due_at", &self.due_at)?,
                last_reviewed_at: Some(reviewed_at),
            },
            card_version: self.card_version,
            idempotency_key: self.idempotency_key,
        })
    }
}

fn counter(id: CardId, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        CardStoreError::InternalInconsistency(format!("card {id}: {column} = {value}"))
    })
}

fn timestamp(id: CardId, column: &str, value: &str) -> Result<DateTime<Utc>> {
    parse_ts(value).ok_or_else(|| {
        CardStoreError::InternalInconsistency(format!("card {id}: {column} = {value:?} is not RFC3339"))
    })
}
