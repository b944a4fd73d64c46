//! `arbor-srs`: the spaced-repetition scheduling engine.
//!
//! # Overview
//!
//! Two pure components, neither of which performs I/O or reads the clock:
//!
//! | Component                          | Input                                   | Output                    |
//! |------------------------------------|-----------------------------------------|---------------------------|
//! | [`review::ReviewScheduler`]        | card state, quality, review timestamp   | next scheduling state     |
//! | [`queue::QueueBuilder`]            | due pool, new pool, limit, `now`        | ranked, bounded card list |
//!
//! Persistence is the caller's job. A review result must be written back only
//! against the exact snapshot it was computed from: `update` is not a
//! compare-and-swap, and applying it twice double-counts the outcome.

pub mod error;
pub mod queue;
pub mod review;
pub mod tiebreak;
pub mod types;

pub use error::{Result, SrsError};
pub use queue::{priority_score, QueueBuilder};
pub use review::{ReviewScheduler, Scheduler};
pub use tiebreak::{CardIdOrder, RandomJitter, TieBreak};
pub use types::{Candidate, Quality, SchedulingState};
