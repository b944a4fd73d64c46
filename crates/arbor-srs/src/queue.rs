use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, SrsError};
use crate::tiebreak::TieBreak;
use crate::types::{Candidate, SchedulingState};

pub const W_OVERDUE: f64 = 10.0;
pub const W_EASE: f64 = 5.0;
pub const W_LAPSES: f64 = 2.0;

const SECS_PER_DAY: i64 = 86_400;

/// Whole days elapsed since `due_at`, floored. Negative for future due dates.
pub fn days_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - due_at).num_seconds().div_euclid(SECS_PER_DAY)
}

/// Priority of a card before tie-breaking; higher is shown first.
///
/// `max(0, daysOverdue) * 10 + (1 / easeFactor) * 5 + lapses * 2`
pub fn priority_score(state: &SchedulingState, now: DateTime<Utc>) -> f64 {
    let overdue = days_overdue(state.due_at, now).max(0) as f64;
    overdue * W_OVERDUE + (1.0 / state.ease_factor) * W_EASE + f64::from(state.lapses) * W_LAPSES
}

/// Ranks one user's candidate cards into a bounded study batch.
///
/// Holds no per-user state between calls: each build is an independent
/// computation over the pools it is given. Pools are trusted to be already
/// filtered by owner and suspension.
pub struct QueueBuilder {
    tie_break: Box<dyn TieBreak + Send>,
}

impl QueueBuilder {
    pub fn new(tie_break: impl TieBreak + Send + 'static) -> Self {
        Self {
            tie_break: Box::new(tie_break),
        }
    }

    pub fn from_boxed(tie_break: Box<dyn TieBreak + Send>) -> Self {
        Self { tie_break }
    }

    /// Merge the due and new pools, rank by priority and keep the top `limit`.
    ///
    /// A card present in both pools is counted once, as a due card. Fewer
    /// candidates than `limit` returns all of them.
    pub fn build<C: Candidate>(
        &mut self,
        due_pool: Vec<C>,
        new_pool: Vec<C>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<C>> {
        if limit == 0 {
            return Err(SrsError::InvalidInput {
                field: "limit",
                reason: "must be a positive integer".into(),
            });
        }

        let (due_count, new_count) = (due_pool.len(), new_pool.len());
        let mut seen = HashSet::with_capacity(due_count + new_count);
        let mut ranked: Vec<(f64, C)> = due_pool
            .into_iter()
            .chain(new_pool)
            .filter(|card| seen.insert(card.card_id()))
            .map(|card| {
                let score = priority_score(card.scheduling_state(), now)
                    + self.tie_break.jitter(card.card_id());
                (score, card)
            })
            .collect();

        ranked.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| a.card_id().cmp(&b.card_id()))
        });
        ranked.truncate(limit);

        debug!(
            due = due_count,
            new = new_count,
            distinct = seen.len(),
            selected = ranked.len(),
            limit,
            "study queue built"
        );
        Ok(ranked.into_iter().map(|(_, card)| card).collect())
    }
}
