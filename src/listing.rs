use crate::models::{Movie, MoviePage};
use crate::tmdb::{TmdbError, TmdbResult};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Where the displayed results came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "query", rename_all = "snake_case")]
pub enum Source {
    Popular,
    Search(String),
    Rated,
}

impl Source {
    /// Empty text means the default listing.
    pub fn for_query(query: &str) -> Self {
        if query.is_empty() {
            Source::Popular
        } else {
            Source::Search(query.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingState {
    pub source: Option<Source>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub loading: bool,
    pub error: Option<String>,
    pub offline: bool,
    pub results: Vec<Movie>,
}

impl Default for ListingState {
    fn default() -> Self {
        Self {
            source: None,
            current_page: 1,
            total_pages: 1,
            total_results: 0,
            loading: false,
            error: None,
            offline: false,
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied,
    Failed(String),
    /// A fetch dispatched later had already been applied.
    Stale,
}

struct Inner {
    state: ListingState,
    next_seq: u64,
    applied_seq: u64,
    in_flight: usize,
}

/// Paged result set shared by the search and rated views.
///
/// Every fetch gets a sequence number at dispatch. A completion is applied
/// only if no later-dispatched fetch has been applied before it, so the view
/// follows the most recent intent rather than the slowest response.
pub struct Listing {
    inner: Mutex<Inner>,
}

impl Default for Listing {
    fn default() -> Self {
        Self::new()
    }
}

impl Listing {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ListingState::default(),
                next_seq: 0,
                applied_seq: 0,
                in_flight: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ListingState {
        self.lock().state.clone()
    }

    pub fn reset_page(&self) {
        self.lock().state.current_page = 1;
    }

    /// Page count last reported for `source`, if it is what is on display.
    pub fn last_page(&self, source: &Source) -> Option<u32> {
        let inner = self.lock();
        match &inner.state.source {
            Some(shown) if shown == source => Some(inner.state.total_pages),
            _ => None,
        }
    }

    pub async fn fetch<Fut>(&self, source: Source, page: u32, request: Fut) -> FetchOutcome
    where
        Fut: Future<Output = TmdbResult<MoviePage>>,
    {
        let seq = self.begin();
        let _in_flight = InFlight { listing: self };
        debug!(seq, page, source = ?source, "Fetch dispatched");
        let result = request.await;
        self.complete(seq, source, page, result)
    }

    fn begin(&self) -> u64 {
        let mut inner = self.lock();
        inner.next_seq += 1;
        inner.in_flight += 1;
        inner.state.loading = true;
        inner.state.error = None;
        inner.state.offline = false;
        inner.next_seq
    }

    fn complete(
        &self,
        seq: u64,
        source: Source,
        page: u32,
        result: TmdbResult<MoviePage>,
    ) -> FetchOutcome {
        let mut inner = self.lock();
        if seq <= inner.applied_seq {
            debug!(seq, applied = inner.applied_seq, "Discarding stale response");
            return FetchOutcome::Stale;
        }
        inner.applied_seq = seq;
        match result {
            Ok(data) => {
                let state = &mut inner.state;
                state.total_pages = data.total_pages.max(1);
                state.current_page = page.clamp(1, state.total_pages);
                state.total_results = data.total_results;
                state.results = data.results;
                state.source = Some(source);
                state.error = None;
                state.offline = false;
                debug!(
                    seq,
                    page = state.current_page,
                    total_pages = state.total_pages,
                    count = state.results.len(),
                    "Fetch applied"
                );
                FetchOutcome::Applied
            }
            Err(err) => {
                warn!(seq, page, "Fetch failed: {}", err);
                let message = describe_failure(&err);
                inner.state.error = Some(message.clone());
                inner.state.offline = err.is_offline();
                FetchOutcome::Failed(message)
            }
        }
    }
}

/// Releases the loading flag however the fetch ends, including cancellation.
struct InFlight<'a> {
    listing: &'a Listing,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.listing.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.state.loading = inner.in_flight > 0;
    }
}

pub fn describe_failure(err: &TmdbError) -> String {
    match err {
        TmdbError::Network(_) => {
            "You appear to be offline. Please check your internet connection and try again."
                .to_string()
        }
        TmdbError::Status { status, .. } => format!("TMDB request failed with status {}", status),
        other => format!("Something went wrong while fetching movies: {}", other),
    }
}
