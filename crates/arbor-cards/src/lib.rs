//! `arbor-cards`: SQLite-backed flashcard store.
//!
//! Owns persistence of the scheduling fields the engine reads and writes.
//! Every review write is conditional on the `version` the caller read, so a
//! state computed from a stale snapshot is rejected instead of overwriting a
//! concurrent review.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::CardStoreError;
pub use store::CardStore;
pub use types::{CandidatePools, NewCard, ReviewRecord, StoredCard};
