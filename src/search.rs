use crate::debounce::Debouncer;
use crate::listing::{FetchOutcome, Listing, ListingState, Source};
use crate::tmdb::TmdbApi;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchState {
    /// Raw text as typed, before debouncing and trimming.
    pub query: String,
    /// Trimmed text of the most recently dispatched fetch.
    pub active_query: String,
    pub debounce_pending: bool,
    #[serde(flatten)]
    pub listing: ListingState,
}

#[derive(Default)]
struct QueryState {
    input: String,
    active: String,
}

struct Shared {
    tmdb: Arc<dyn TmdbApi>,
    listing: Listing,
    query: Mutex<QueryState>,
}

impl Shared {
    fn query(&self) -> MutexGuard<'_, QueryState> {
        self.query.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Debounce fired: always page 1 of whatever the text is now.
    async fn evaluate(&self) -> FetchOutcome {
        let query = {
            let mut q = self.query();
            let trimmed = q.input.trim().to_string();
            if trimmed != q.active {
                self.listing.reset_page();
            }
            q.active = trimmed.clone();
            trimmed
        };
        info!("Searching for '{}'", query);
        self.fetch(query, 1).await
    }

    async fn fetch(&self, query: String, page: u32) -> FetchOutcome {
        let source = Source::for_query(&query);
        let tmdb = self.tmdb.clone();
        self.listing
            .fetch(source, page, async move {
                if query.is_empty() {
                    tmdb.fetch_popular(page).await
                } else {
                    tmdb.search_movies(&query, page).await
                }
            })
            .await
    }
}

/// Owns the query text, the debounce timer and the displayed result page.
pub struct SearchCoordinator {
    shared: Arc<Shared>,
    debouncer: Debouncer,
}

impl SearchCoordinator {
    pub fn new(tmdb: Arc<dyn TmdbApi>, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tmdb,
                listing: Listing::new(),
                query: Mutex::new(QueryState::default()),
            }),
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Default listing, first page.
    pub async fn load_initial(&self) -> FetchOutcome {
        self.shared.query().active.clear();
        self.shared.fetch(String::new(), 1).await
    }

    /// Records the text right away and (re)starts the quiet period.
    pub fn set_query(&self, text: &str) {
        self.shared.query().input = text.to_string();
        let shared = self.shared.clone();
        self.debouncer.schedule(move || async move {
            shared.evaluate().await;
        });
        debug!(
            delay_ms = self.debouncer.delay().as_millis() as u64,
            "Search scheduled"
        );
    }

    /// Immediate fetch of `page` for the current text. Leaves the debounce
    /// timer alone. Pages past the known end are pulled back to the last one.
    pub async fn go_to_page(&self, page: u32) -> FetchOutcome {
        let query = {
            let mut q = self.shared.query();
            let trimmed = q.input.trim().to_string();
            q.active = trimmed.clone();
            trimmed
        };
        let last = self.shared.listing.last_page(&Source::for_query(&query));
        let page = page.clamp(1, last.unwrap_or(u32::MAX));
        debug!(page, query = %query, "Page change");
        self.shared.fetch(query, page).await
    }

    pub fn snapshot(&self) -> SearchState {
        let (query, active_query) = {
            let q = self.shared.query();
            (q.input.clone(), q.active.clone())
        };
        SearchState {
            query,
            active_query,
            debounce_pending: self.debouncer.is_pending(),
            listing: self.shared.listing.snapshot(),
        }
    }

    /// Cancels a pending debounced search. Fetches already running finish.
    pub fn shutdown(&self) {
        if self.debouncer.cancel() {
            debug!("Cancelled pending search on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenreMap, Movie, MovieId, MoviePage};
    use crate::tmdb::{TmdbError, TmdbResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Search(String, u32),
        Popular(u32),
    }

    #[derive(Default)]
    struct FakeTmdb {
        calls: Mutex<Vec<Call>>,
        failures: Mutex<VecDeque<TmdbError>>,
        latency: Mutex<VecDeque<Duration>>,
        total_pages: Mutex<u32>,
    }

    impl FakeTmdb {
        fn with_total_pages(total: u32) -> Arc<Self> {
            let fake = Self::default();
            *fake.total_pages.lock().unwrap() = total;
            Arc::new(fake)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        async fn respond(&self, title: String, page: u32) -> TmdbResult<MoviePage> {
            let delay = self.latency.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let results = (0..20)
                .map(|i| Movie {
                    id: (page as u64) * 100 + i,
                    title: format!("{title} #{i}"),
                    overview: String::new(),
                    poster_path: None,
                    release_date: String::new(),
                    genre_ids: vec![],
                    vote_average: 6.0,
                    rating: None,
                })
                .collect();
            Ok(MoviePage {
                page,
                results,
                total_pages: *self.total_pages.lock().unwrap(),
                total_results: 1000,
            })
        }
    }

    #[async_trait]
    impl TmdbApi for FakeTmdb {
        async fn search_movies(&self, query: &str, page: u32) -> TmdbResult<MoviePage> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Search(query.to_string(), page));
            self.respond(query.to_string(), page).await
        }
        async fn fetch_popular(&self, page: u32) -> TmdbResult<MoviePage> {
            self.calls.lock().unwrap().push(Call::Popular(page));
            self.respond("Popular".to_string(), page).await
        }
        async fn fetch_genres(&self) -> TmdbResult<GenreMap> {
            Ok(GenreMap::new())
        }
        async fn create_guest_session(&self) -> TmdbResult<String> {
            Ok("guest".to_string())
        }
        async fn rate_movie(&self, _id: MovieId, _value: f32, _session: &str) -> TmdbResult<()> {
            Ok(())
        }
        async fn fetch_rated_movies(&self, _session: &str, page: u32) -> TmdbResult<MoviePage> {
            Ok(MoviePage::empty(page))
        }
    }

    const QUIET: Duration = Duration::from_millis(500);

    async fn settle() {
        tokio::time::sleep(QUIET + Duration::from_millis(1)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_query_fetches_trimmed_text_on_page_one() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);

        coordinator.set_query("  Batman ");
        assert_eq!(coordinator.snapshot().query, "  Batman ");
        assert!(tmdb.calls().is_empty());

        settle().await;
        assert_eq!(tmdb.calls(), vec![Call::Search("Batman".into(), 1)]);
        let state = coordinator.snapshot();
        assert_eq!(state.listing.current_page, 1);
        assert_eq!(state.listing.total_pages, 3);
        assert_eq!(state.active_query, "Batman");
        assert!(!state.debounce_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_typing_only_fetches_the_final_text() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);

        for text in ["B", "Ba", "Bat", "Batm", "Batma", "Batman"] {
            coordinator.set_query(text);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(tmdb.calls().is_empty());
        settle().await;
        assert_eq!(tmdb.calls(), vec![Call::Search("Batman".into(), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_switches_to_the_default_listing() {
        let tmdb = FakeTmdb::with_total_pages(50);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);

        coordinator.set_query("   ");
        settle().await;
        assert_eq!(tmdb.calls(), vec![Call::Popular(1)]);
        assert_eq!(coordinator.snapshot().listing.source, Some(Source::Popular));
    }

    #[tokio::test(start_paused = true)]
    async fn default_listing_then_search_replaces_results() {
        let tmdb = FakeTmdb::with_total_pages(50);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);

        assert_eq!(coordinator.load_initial().await, FetchOutcome::Applied);
        let state = coordinator.snapshot();
        assert_eq!(state.listing.results.len(), 20);
        assert_eq!(
            (state.listing.current_page, state.listing.total_pages),
            (1, 50)
        );

        *tmdb.total_pages.lock().unwrap() = 3;
        coordinator.set_query("Batman");
        settle().await;

        let state = coordinator.snapshot();
        assert_eq!(
            state.listing.source,
            Some(Source::Search("Batman".to_string()))
        );
        assert_eq!(
            (state.listing.current_page, state.listing.total_pages),
            (1, 3)
        );
        assert!(state.listing.results[0].title.starts_with("Batman"));
    }

    #[tokio::test(start_paused = true)]
    async fn go_to_page_is_immediate_and_updates_on_success() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        settle().await;
        coordinator.go_to_page(2).await;

        tmdb.latency
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        let outcome = coordinator.go_to_page(3).await;
        assert_eq!(outcome, FetchOutcome::Applied);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < QUIET);
        assert_eq!(coordinator.snapshot().listing.current_page, 3);
        assert_eq!(tmdb.calls().last(), Some(&Call::Search("Batman".into(), 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn current_page_changes_only_after_success() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = Arc::new(SearchCoordinator::new(tmdb.clone(), QUIET));
        coordinator.set_query("Batman");
        settle().await;
        coordinator.go_to_page(2).await;

        tmdb.latency
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(100));
        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.go_to_page(3).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mid_flight = coordinator.snapshot();
        assert!(mid_flight.listing.loading);
        assert_eq!(mid_flight.listing.current_page, 2);

        pending.await.unwrap();
        let done = coordinator.snapshot();
        assert!(!done.listing.loading);
        assert_eq!(done.listing.current_page, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_page_change_keeps_page_and_results() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        settle().await;
        let before = coordinator.snapshot().listing.results.clone();

        tmdb.failures
            .lock()
            .unwrap()
            .push_back(TmdbError::Network("connection refused".into()));
        let outcome = coordinator.go_to_page(2).await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));

        let state = coordinator.snapshot();
        assert_eq!(state.listing.current_page, 1);
        assert_eq!(state.listing.results, before);
        assert!(state.listing.offline);
        assert!(!state.listing.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn new_query_resets_page_before_the_fetch_completes() {
        let tmdb = FakeTmdb::with_total_pages(5);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        settle().await;
        coordinator.go_to_page(4).await;
        assert_eq!(coordinator.snapshot().listing.current_page, 4);

        tmdb.latency
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(200));
        coordinator.set_query("Superman");
        tokio::time::sleep(QUIET + Duration::from_millis(10)).await;

        let state = coordinator.snapshot();
        assert!(state.listing.loading);
        assert_eq!(state.listing.current_page, 1);
        assert_eq!(
            state.listing.source,
            Some(Source::Search("Batman".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_search_does_not_overwrite_newer_page() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = Arc::new(SearchCoordinator::new(tmdb.clone(), QUIET));

        // The debounced search is slow; a page click dispatched after it wins.
        tmdb.latency
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(400));
        coordinator.set_query("Batman");
        tokio::time::sleep(QUIET + Duration::from_millis(1)).await;
        assert_eq!(coordinator.go_to_page(2).await, FetchOutcome::Applied);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = coordinator.snapshot();
        assert_eq!(state.listing.current_page, 2);
        assert!(!state.listing.loading);
        assert_eq!(tmdb.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn page_past_the_end_fetches_the_last_page() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        settle().await;

        assert_eq!(coordinator.go_to_page(9).await, FetchOutcome::Applied);
        assert_eq!(tmdb.calls().last(), Some(&Call::Search("Batman".into(), 3)));
        let state = coordinator.snapshot();
        assert_eq!(state.listing.current_page, 3);
        assert_eq!(state.listing.results[0].id, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn page_change_leaves_the_pending_search_scheduled() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        settle().await;

        coordinator.set_query("Superman");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.go_to_page(2).await, FetchOutcome::Applied);
        assert!(coordinator.snapshot().debounce_pending);

        settle().await;
        assert_eq!(
            tmdb.calls(),
            vec![
                Call::Search("Batman".into(), 1),
                Call::Search("Superman".into(), 2),
                Call::Search("Superman".into(), 1),
            ]
        );
        let state = coordinator.snapshot();
        assert!(!state.debounce_pending);
        assert_eq!(state.listing.current_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_the_pending_search() {
        let tmdb = FakeTmdb::with_total_pages(3);
        let coordinator = SearchCoordinator::new(tmdb.clone(), QUIET);
        coordinator.set_query("Batman");
        assert!(coordinator.snapshot().debounce_pending);
        coordinator.shutdown();
        settle().await;
        assert!(tmdb.calls().is_empty());
    }
}
