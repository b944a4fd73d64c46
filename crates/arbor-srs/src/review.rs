//! SM-2 review update.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation

use arbor_core::types::{is_storable, MAX_STORABLE_YEAR};
use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::error::{Result, SrsError};
use crate::types::{Quality, SchedulingState, MAX_QUALITY, MIN_EASE_FACTOR};

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;
const LAPSE_INTERVAL_DAYS: u32 = 1;

/// A per-card scheduling rule.
pub trait Scheduler {
    /// Compute the state that follows a review of `state` at `review_time`.
    fn update(
        &self,
        state: &SchedulingState,
        quality: Quality,
        review_time: DateTime<Utc>,
    ) -> Result<SchedulingState>;
}

/// SM-2 variant: lapses reset the streak but keep the ease factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewScheduler;

impl Scheduler for ReviewScheduler {
    fn update(
        &self,
        state: &SchedulingState,
        quality: Quality,
        review_time: DateTime<Utc>,
    ) -> Result<SchedulingState> {
        state.validate()?;

        let mut next = state.clone();
        if quality.is_lapse() {
            next.repetition = 0;
            next.interval_days = LAPSE_INTERVAL_DAYS;
            next.lapses = state
                .lapses
                .checked_add(1)
                .ok_or_else(|| SrsError::InternalInconsistency("lapse counter overflow".into()))?;
        } else {
            next.repetition = state.repetition.checked_add(1).ok_or_else(|| {
                SrsError::InternalInconsistency("repetition counter overflow".into())
            })?;
            next.interval_days = match next.repetition {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                _ => grow_interval(state.interval_days, state.ease_factor)?,
            };
            next.ease_factor = adjust_ease(state.ease_factor, quality);
        }

        next.due_at = review_time
            .checked_add_signed(Duration::days(i64::from(next.interval_days)))
            .ok_or_else(|| {
                SrsError::InternalInconsistency(format!(
                    "due date for a {}-day interval is out of range",
                    next.interval_days
                ))
            })?;
        if !is_storable(review_time) || !is_storable(next.due_at) {
            return Err(SrsError::InvalidInput {
                field: "reviewTime",
                reason: format!(
                    "a {}-day interval from {review_time} ends after year {MAX_STORABLE_YEAR}",
                    next.interval_days
                ),
            });
        }
        next.last_reviewed_at = Some(review_time);

        trace!(
            quality = quality.value(),
            repetition = next.repetition,
            interval_days = next.interval_days,
            ease_factor = next.ease_factor,
            "review applied"
        );
        Ok(next)
    }
}

impl ReviewScheduler {
    /// Interval each quality would produce, indexed by quality (0..=5).
    ///
    /// Lets a client label its rating buttons before the user answers.
    pub fn preview(
        &self,
        state: &SchedulingState,
        review_time: DateTime<Utc>,
    ) -> Result<[u32; MAX_QUALITY as usize + 1]> {
        let mut intervals = [0u32; MAX_QUALITY as usize + 1];
        for quality in Quality::all() {
            intervals[quality.value() as usize] =
                self.update(state, quality, review_time)?.interval_days;
        }
        Ok(intervals)
    }
}

/// Third and later successes: previous interval times the ease factor,
/// rounded half away from zero. A zero interval grows from one day.
fn grow_interval(previous: u32, ease_factor: f64) -> Result<u32> {
    let grown = (f64::from(previous.max(1)) * ease_factor).round();
    if grown > f64::from(u32::MAX) {
        return Err(SrsError::InternalInconsistency(format!(
            "interval {grown} days does not fit the schedule"
        )));
    }
    Ok(grown as u32)
}

/// EF' = EF + 0.1 - (5-q) * (0.08 + (5-q) * 0.02), floored at 1.3.
fn adjust_ease(ease_factor: f64, quality: Quality) -> f64 {
    let miss = f64::from(MAX_QUALITY - quality.value());
    (ease_factor + 0.1 - miss * (0.08 + miss * 0.02)).max(MIN_EASE_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn q(v: u8) -> Quality {
        Quality::new(v).unwrap()
    }

    fn state(repetition: u32, interval_days: u32, ease_factor: f64, lapses: u32) -> SchedulingState {
        SchedulingState {
            repetition,
            interval_days,
            ease_factor,
            lapses,
            due_at: day(1),
            last_reviewed_at: None,
        }
    }

    #[test]
    fn first_success_schedules_one_day() {
        let next = ReviewScheduler
            .update(&state(0, 0, 2.5, 0), q(4), day(1))
            .unwrap();
        assert_eq!(next.repetition, 1);
        assert_eq!(next.interval_days, 1);
        assert!((next.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(next.due_at, day(2));
        assert_eq!(next.last_reviewed_at, Some(day(1)));
    }

    #[test]
    fn second_success_schedules_six_days() {
        let first = ReviewScheduler
            .update(&state(0, 0, 2.5, 0), q(4), day(1))
            .unwrap();
        let second = ReviewScheduler.update(&first, q(4), day(2)).unwrap();
        assert_eq!(second.repetition, 2);
        assert_eq!(second.interval_days, 6);
        assert_eq!(second.due_at, day(8));
    }

    #[test]
    fn lapse_resets_streak_and_keeps_ease() {
        let next = ReviewScheduler
            .update(&state(5, 20, 2.0, 0), q(1), day(1))
            .unwrap();
        assert_eq!(next.repetition, 0);
        assert_eq!(next.interval_days, 1);
        assert_eq!(next.lapses, 1);
        assert_eq!(next.ease_factor, 2.0);
        assert_eq!(next.due_at, day(2));
    }

    #[test]
    fn later_success_multiplies_previous_interval() {
        let next = ReviewScheduler
            .update(&state(2, 6, 2.5, 0), q(5), day(1))
            .unwrap();
        assert_eq!(next.repetition, 3);
        assert_eq!(next.interval_days, 15);
        assert!((next.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(next.due_at, day(16));
    }

    #[test]
    fn interval_rounds_half_away_from_zero() {
        // 5 * 2.5 = 12.5
        let next = ReviewScheduler
            .update(&state(2, 5, 2.5, 0), q(4), day(1))
            .unwrap();
        assert_eq!(next.interval_days, 13);
    }

    #[test]
    fn zero_prior_interval_grows_from_one_day() {
        let next = ReviewScheduler
            .update(&state(2, 0, 2.5, 0), q(4), day(1))
            .unwrap();
        assert_eq!(next.interval_days, 3);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let mut current = state(3, 10, 1.35, 0);
        for (i, quality) in [3u8, 3, 3, 0, 3, 4, 3].into_iter().enumerate() {
            current = ReviewScheduler
                .update(&current, q(quality), day(1) + Duration::days(i as i64 * 40))
                .unwrap();
            assert!(current.ease_factor >= MIN_EASE_FACTOR);
        }
        assert_eq!(current.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn lapses_count_exactly_the_failures() {
        let mut current = state(0, 0, 2.5, 0);
        let mut at = day(1);
        for quality in [4u8, 2, 5, 0, 3, 1, 5] {
            let before = current.lapses;
            current = ReviewScheduler.update(&current, q(quality), at).unwrap();
            let expected = if quality < 3 { before + 1 } else { before };
            assert_eq!(current.lapses, expected);
            if quality < 3 {
                assert_eq!(current.repetition, 0);
                assert_eq!(current.interval_days, 1);
            }
            at = current.due_at;
        }
        assert_eq!(current.lapses, 3);
    }

    #[test]
    fn due_date_derives_from_review_time() {
        let review_time = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        for quality in Quality::all() {
            let next = ReviewScheduler
                .update(&state(4, 9, 2.2, 1), quality, review_time)
                .unwrap();
            let reviewed = next.last_reviewed_at.unwrap();
            assert_eq!(reviewed, review_time);
            assert_eq!(
                next.due_at,
                reviewed + Duration::days(i64::from(next.interval_days))
            );
            assert!(next.interval_days >= 1);
        }
    }

    #[test]
    fn inconsistent_state_is_rejected() {
        let err = ReviewScheduler
            .update(&state(2, 6, 1.0, 0), q(4), day(1))
            .unwrap_err();
        assert!(matches!(err, SrsError::InternalInconsistency(_)));
    }

    #[test]
    fn runaway_interval_is_rejected() {
        let err = ReviewScheduler
            .update(&state(9, u32::MAX, 2.5, 0), q(5), day(1))
            .unwrap_err();
        assert!(matches!(err, SrsError::InternalInconsistency(_)));
    }

    #[test]
    fn due_date_past_year_9999_is_rejected() {
        // ~8200 years after 2024
        let mature = state(14, 3_000_000, 2.5, 0);
        let err = ReviewScheduler.update(&mature, q(5), day(1)).unwrap_err();
        assert!(matches!(err, SrsError::InvalidInput { field: "reviewTime", .. }));

        // a lapse is still schedulable
        let lapsed = ReviewScheduler.update(&mature, q(1), day(1)).unwrap();
        assert_eq!(lapsed.due_at, day(2));
    }

    #[test]
    fn preview_lists_interval_per_quality() {
        let intervals = ReviewScheduler
            .preview(&state(2, 10, 2.5, 0), day(1))
            .unwrap();
        assert_eq!(intervals, [1, 1, 1, 25, 25, 25]);
    }
}
