use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arbor_cards::CardStore;
use arbor_core::config::ArborConfig;
use arbor_srs::{tiebreak, QueueBuilder, ReviewScheduler};
use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::http::{cards, health, queue, review};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ArborConfig,
    pub cards: CardStore,
    pub scheduler: ReviewScheduler,
    /// Held only for the synchronous ranking step; the tie-break RNG is the
    /// only mutable part.
    queue: Mutex<QueueBuilder>,
}

impl AppState {
    pub fn new(config: ArborConfig, cards: CardStore) -> Self {
        let tie_break = tiebreak::from_mode(config.queue.tie_break, config.queue.seed);
        Self {
            config,
            cards,
            scheduler: ReviewScheduler,
            queue: Mutex::new(QueueBuilder::from_boxed(tie_break)),
        }
    }

    pub fn queue(&self) -> MutexGuard<'_, QueueBuilder> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/flashcards", post(cards::create_card))
        .route("/api/flashcards/queue", get(queue::queue_handler))
        .route("/api/flashcards/review", post(review::review_handler))
        .route(
            "/api/flashcards/{id}",
            get(cards::get_card)
                .put(cards::update_card)
                .delete(cards::delete_card),
        )
        .route("/api/flashcards/{id}/suspend", patch(cards::suspend_card))
        .route("/api/flashcards/{id}/preview", get(cards::preview_card))
        .route("/api/flashcards/{id}/reviews", get(cards::card_reviews))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
