use arbor_core::config::TieBreakMode;
use arbor_core::CardId;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Upper bound (exclusive) for any jitter added to a priority score.
///
/// Smaller than one step of the integer overdue and lapse terms, so jitter
/// cannot reorder cards that differ only in overdue days or lapse count.
/// The ease term is continuous, so any two cards whose scores lie within
/// `MAX_JITTER` of each other may still swap.
pub const MAX_JITTER: f64 = 1e-4;

/// Strategy for separating cards whose priority scores are exactly equal.
pub trait TieBreak {
    /// Perturbation in `[0, MAX_JITTER)` added to the score of card `id`.
    fn jitter(&mut self, id: CardId) -> f64;
}

/// Random jitter; which card wins a tie is unspecified.
pub struct RandomJitter<R = StdRng> {
    rng: R,
}

impl RandomJitter<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence, for tests and replayable sessions.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomJitter<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> TieBreak for RandomJitter<R> {
    fn jitter(&mut self, _id: CardId) -> f64 {
        self.rng.gen_range(0.0..MAX_JITTER)
    }
}

/// No jitter: exact ties fall through to ascending card id.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardIdOrder;

impl TieBreak for CardIdOrder {
    fn jitter(&mut self, _id: CardId) -> f64 {
        0.0
    }
}

/// Build the strategy selected in `[queue]` config.
pub fn from_mode(mode: TieBreakMode, seed: Option<u64>) -> Box<dyn TieBreak + Send> {
    match (mode, seed) {
        (TieBreakMode::CardId, _) => Box::new(CardIdOrder),
        (TieBreakMode::Random, Some(seed)) => Box::new(RandomJitter::seeded(seed)),
        (TieBreakMode::Random, None) => Box::new(RandomJitter::from_entropy()),
    }
}
