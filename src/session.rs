use crate::config::Config;
use crate::models::GenreMap;
use crate::tmdb::TmdbApi;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

/// Per-process identity and lookup data: the guest session token and the
/// genre table. Both are written once during startup.
#[derive(Debug, Default)]
pub struct Session {
    guest_session_id: Option<String>,
    genres: OnceCell<GenreMap>,
}

impl Session {
    pub fn new(guest_session_id: Option<String>) -> Self {
        Self {
            guest_session_id,
            genres: OnceCell::new(),
        }
    }

    /// Always starts a fresh guest session; nothing is reused between runs.
    pub async fn bootstrap(tmdb: &dyn TmdbApi, config: &Config) -> Self {
        let guest_session_id = if config.ratings_enabled() {
            match tmdb.create_guest_session().await {
                Ok(id) => {
                    info!("Guest session created");
                    Some(id)
                }
                Err(e) => {
                    warn!("Failed to create guest session, ratings stay local: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let session = Self::new(guest_session_id);
        session.load_genres(tmdb).await;
        session
    }

    pub fn guest_session_id(&self) -> Option<&str> {
        self.guest_session_id.as_deref()
    }

    /// Fetches the genre table the first time only. A failure leaves an
    /// empty table for the rest of the session.
    pub async fn load_genres(&self, tmdb: &dyn TmdbApi) -> &GenreMap {
        if let Some(genres) = self.genres.get() {
            return genres;
        }
        let loaded = match tmdb.fetch_genres().await {
            Ok(genres) => {
                info!("Loaded {} genres", genres.len());
                genres
            }
            Err(e) => {
                warn!("Failed to load genres: {}", e);
                GenreMap::new()
            }
        };
        // A concurrent loader may have won; its table is kept.
        self.genres.get_or_init(|| loaded)
    }

    pub fn genres(&self) -> GenreMap {
        self.genres.get().cloned().unwrap_or_default()
    }

    /// Names for the ids that are known, in the given order.
    pub fn genre_names(&self, ids: &[u32]) -> Vec<String> {
        let Some(genres) = self.genres.get() else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| genres.get(id).cloned()).collect()
    }
}
