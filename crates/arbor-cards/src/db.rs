use rusqlite::Connection;

use crate::error::Result;

/// Initialise the flashcard and review-log tables.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
/// Timestamps are fixed-width RFC3339 UTC strings, so `due_at <= ?` compares
/// chronologically.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS flashcards (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id         TEXT    NOT NULL,
            study_set_id     INTEGER,
            name             TEXT    NOT NULL,
            content          TEXT    NOT NULL,
            repetition       INTEGER NOT NULL DEFAULT 0,
            interval_days    INTEGER NOT NULL DEFAULT 0,
            ease_factor      REAL    NOT NULL DEFAULT 2.5,
            lapses           INTEGER NOT NULL DEFAULT 0,
            due_at           TEXT    NOT NULL,
            last_reviewed_at TEXT,
            suspended        INTEGER NOT NULL DEFAULT 0,
            version          INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_flashcards_due
            ON flashcards(owner_id, suspended, due_at);
        CREATE INDEX IF NOT EXISTS idx_flashcards_new
            ON flashcards(owner_id, suspended, repetition);

        CREATE TABLE IF NOT EXISTS review_log (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id          INTEGER NOT NULL,
            owner_id         TEXT    NOT NULL,
            quality          INTEGER NOT NULL,
            reviewed_at      TEXT    NOT NULL,
            repetition       INTEGER NOT NULL,
            interval_days    INTEGER NOT NULL,
            ease_factor      REAL    NOT NULL,
            lapses           INTEGER NOT NULL,
            due_at           TEXT    NOT NULL,
            card_version     INTEGER NOT NULL,
            idempotency_key  TEXT UNIQUE
        );
        CREATE INDEX IF NOT EXISTS idx_review_log_card
            ON review_log(card_id, reviewed_at);",
    )?;
    Ok(())
}
