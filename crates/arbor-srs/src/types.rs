use arbor_core::CardId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SrsError};

/// Ease factor assigned to freshly created cards.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
/// Hard floor for the ease factor, enforced on every update.
pub const MIN_EASE_FACTOR: f64 = 1.3;
/// Highest review quality (perfect recall).
pub const MAX_QUALITY: u8 = 5;
/// Qualities below this count as a lapse.
pub const PASSING_QUALITY: u8 = 3;

/// Long-term scheduling fields of a single flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    /// Consecutive successful reviews since the last lapse.
    pub repetition: u32,
    /// Current gap in days before the card is due again.
    pub interval_days: u32,
    pub ease_factor: f64,
    /// Lifetime count of failed reviews.
    pub lapses: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl SchedulingState {
    /// State of a card that has just been generated and never reviewed.
    pub fn new_card(now: DateTime<Utc>) -> Self {
        Self {
            repetition: 0,
            interval_days: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            lapses: 0,
            due_at: now,
            last_reviewed_at: None,
        }
    }

    /// A card counts as new until it has a successful streak.
    pub fn is_new(&self) -> bool {
        self.repetition == 0
    }

    /// Reject states that only a foreign writer could have produced.
    pub fn validate(&self) -> Result<()> {
        if !self.ease_factor.is_finite() || self.ease_factor < MIN_EASE_FACTOR {
            return Err(SrsError::InternalInconsistency(format!(
                "ease factor {} is below the {MIN_EASE_FACTOR} floor",
                self.ease_factor
            )));
        }
        if let Some(reviewed) = self.last_reviewed_at {
            if self.interval_days == 0 {
                return Err(SrsError::InternalInconsistency(format!(
                    "card reviewed at {reviewed} has a zero-day interval"
                )));
            }
        }
        Ok(())
    }
}

/// Review outcome on the 0..=5 scale (0 = blackout, 5 = perfect recall).
///
/// Only constructible through validation, so the scheduler never has to
/// re-check the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Result<Self> {
        Self::try_from(i64::from(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_lapse(self) -> bool {
        self.0 < PASSING_QUALITY
    }

    /// Every valid quality, lowest first.
    pub fn all() -> impl Iterator<Item = Quality> {
        (0..=MAX_QUALITY).map(Quality)
    }
}

impl TryFrom<i64> for Quality {
    type Error = SrsError;

    fn try_from(value: i64) -> Result<Self> {
        if (0..=i64::from(MAX_QUALITY)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SrsError::InvalidInput {
                field: "quality",
                reason: format!("must be an integer between 0 and {MAX_QUALITY}, got {value}"),
            })
        }
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// Anything the queue builder can rank: an id plus scheduling state.
///
/// Storage implements this for its own card type so a queue can carry card
/// content through ranking without copying it into an engine type.
pub trait Candidate {
    fn card_id(&self) -> CardId;
    fn scheduling_state(&self) -> &SchedulingState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quality_accepts_full_range() {
        for v in 0..=5i64 {
            assert_eq!(Quality::try_from(v).unwrap().value() as i64, v);
        }
        assert!(Quality::new(2).unwrap().is_lapse());
        assert!(!Quality::new(3).unwrap().is_lapse());
    }

    #[test]
    fn quality_rejects_out_of_range() {
        for v in [-1i64, 6, 100] {
            match Quality::try_from(v) {
                Err(SrsError::InvalidInput { field, .. }) => assert_eq!(field, "quality"),
                other => panic!("expected InvalidInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn quality_deserializes_with_validation() {
        let q: Quality = serde_json::from_str("4").unwrap();
        assert_eq!(q.value(), 4);
        assert!(serde_json::from_str::<Quality>("9").is_err());
        assert!(serde_json::from_str::<Quality>("3.5").is_err());
    }

    #[test]
    fn new_card_state_is_valid() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = SchedulingState::new_card(now);
        assert!(state.is_new());
        assert_eq!(state.due_at, now);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn ease_below_floor_is_inconsistent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut state = SchedulingState::new_card(now);
        state.ease_factor = 1.1;
        assert!(matches!(
            state.validate(),
            Err(SrsError::InternalInconsistency(_))
        ));
        state.ease_factor = f64::NAN;
        assert!(state.validate().is_err());
    }
}
