use crate::models::MovieId;
use crate::tmdb::TmdbApi;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const MIN_RATING: f32 = 0.5;
pub const MAX_RATING: f32 = 10.0;

pub type RatingState = BTreeMap<MovieId, f32>;

/// Local rating map plus best-effort forwarding to TMDB.
///
/// The map is what the view shows. A failed push is logged and otherwise
/// ignored, so local and remote ratings may drift apart within a session.
pub struct RatingCoordinator {
    tmdb: Arc<dyn TmdbApi>,
    guest_session_id: Option<String>,
    ratings: Mutex<RatingState>,
}

impl RatingCoordinator {
    pub fn new(tmdb: Arc<dyn TmdbApi>, guest_session_id: Option<String>) -> Self {
        Self {
            tmdb,
            guest_session_id,
            ratings: Mutex::new(RatingState::new()),
        }
    }

    fn ratings(&self) -> MutexGuard<'_, RatingState> {
        self.ratings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the rating immediately, then pushes it in the background.
    ///
    /// The returned handle resolves when the push finishes; dropping it is
    /// fine. No push happens without a guest session.
    pub fn rate(&self, movie_id: MovieId, value: f32) -> Option<JoinHandle<()>> {
        self.ratings().insert(movie_id, value);
        debug!(movie_id, value, "Rating recorded locally");

        let Some(session) = self.guest_session_id.clone() else {
            debug!(movie_id, "No guest session, rating kept locally only");
            return None;
        };
        let tmdb = self.tmdb.clone();
        Some(tokio::spawn(async move {
            match tmdb.rate_movie(movie_id, value, &session).await {
                Ok(()) => debug!(movie_id, value, "Rating pushed to TMDB"),
                Err(e) => warn!("Failed to push rating for movie {}: {}", movie_id, e),
            }
        }))
    }

    pub fn rating(&self, movie_id: MovieId) -> Option<f32> {
        self.ratings().get(&movie_id).copied()
    }

    pub fn snapshot(&self) -> RatingState {
        self.ratings().clone()
    }

    /// Seeds the map from the session's rated list. Entries rated locally in
    /// the meantime win.
    pub async fn sync_from_remote(&self) {
        let Some(session) = self.guest_session_id.as_deref() else {
            return;
        };
        match self.tmdb.fetch_rated_movies(session, 1).await {
            Ok(page) => {
                let mut ratings = self.ratings();
                for movie in page.results {
                    let value = movie.rating.unwrap_or(movie.vote_average);
                    ratings.entry(movie.id).or_insert(value);
                }
                info!("Seeded {} ratings from TMDB", ratings.len());
            }
            Err(e) => warn!("Failed to load rated movies: {}", e),
        }
    }
}

/// Clamps to the TMDB scale and snaps to the nearest half point.
pub fn normalize_rating(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_RATING;
    }
    ((value * 2.0).round() / 2.0).clamp(MIN_RATING, MAX_RATING)
}
