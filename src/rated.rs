use crate::listing::{FetchOutcome, Listing, ListingState, Source};
use crate::models::MoviePage;
use crate::tmdb::TmdbApi;
use std::sync::Arc;
use tracing::debug;

/// The guest session's rated list, paged like search but never debounced.
pub struct RatedListing {
    tmdb: Arc<dyn TmdbApi>,
    guest_session_id: Option<String>,
    listing: Listing,
}

impl RatedListing {
    pub fn new(tmdb: Arc<dyn TmdbApi>, guest_session_id: Option<String>) -> Self {
        Self {
            tmdb,
            guest_session_id,
            listing: Listing::new(),
        }
    }

    pub async fn load(&self, page: u32) -> FetchOutcome {
        let last = self.listing.last_page(&Source::Rated);
        let page = page.clamp(1, last.unwrap_or(u32::MAX));
        let tmdb = self.tmdb.clone();
        let session = self.guest_session_id.clone();
        debug!(page, has_session = session.is_some(), "Loading rated movies");
        self.listing
            .fetch(Source::Rated, page, async move {
                match session {
                    Some(session) => tmdb.fetch_rated_movies(&session, page).await,
                    None => Ok(MoviePage::empty(page)),
                }
            })
            .await
    }

    pub fn snapshot(&self) -> ListingState {
        self.listing.snapshot()
    }
}
