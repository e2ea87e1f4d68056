use crate::config::Config;
use crate::listing::{FetchOutcome, ListingState};
use crate::models::{GenreMap, MovieId, PAGE_SIZE};
use crate::rated::RatedListing;
use crate::rating::{self, RatingCoordinator, RatingState};
use crate::search::{SearchCoordinator, SearchState};
use crate::session::Session;
use crate::tmdb::{TmdbApi, TmdbClient};
use crate::view::{Banner, MovieCard};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchCoordinator>,
    pub ratings: Arc<RatingCoordinator>,
    pub rated: Arc<RatedListing>,
    pub session: Arc<Session>,
    pub image_base_url: String,
}

impl AppState {
    pub fn new(tmdb: Arc<dyn TmdbApi>, session: Arc<Session>, config: &Config) -> Self {
        let guest = session.guest_session_id().map(str::to_string);
        Self {
            search: Arc::new(SearchCoordinator::new(tmdb.clone(), config.debounce)),
            ratings: Arc::new(RatingCoordinator::new(tmdb.clone(), guest.clone())),
            rated: Arc::new(RatedListing::new(tmdb, guest)),
            session,
            image_base_url: config.image_base_url.clone(),
        }
    }

    fn cards(&self, listing: &ListingState) -> Vec<MovieCard> {
        let ratings = self.ratings.snapshot();
        listing
            .results
            .iter()
            .map(|m| MovieCard::build(m, &self.session, &ratings, &self.image_base_url))
            .collect()
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(&config)?);
    let session = Arc::new(Session::bootstrap(tmdb.as_ref(), &config).await);
    let state = AppState::new(tmdb, session, &config);

    state.ratings.sync_from_remote().await;
    if let FetchOutcome::Failed(message) = state.search.load_initial().await {
        warn!("Initial listing failed: {}", message);
    }

    let search = state.search.clone();
    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    search.shutdown();
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/state", get(current_state))
        .route("/api/movies", get(movies))
        .route("/api/query", post(set_query))
        .route("/api/page", post(go_to_page))
        .route("/api/rate", post(rate))
        .route("/api/rated", get(rated))
        .route("/api/genres", get(genres))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct StateView {
    pub search: SearchState,
    pub banner: Option<Banner>,
    pub ratings: RatingState,
    pub ratings_enabled: bool,
    pub page_size: u32,
}

fn state_view(state: &AppState) -> StateView {
    let search = state.search.snapshot();
    StateView {
        banner: Banner::for_listing(&search.listing),
        search,
        ratings: state.ratings.snapshot(),
        ratings_enabled: state.session.guest_session_id().is_some(),
        page_size: PAGE_SIZE,
    }
}

fn outcome_status(outcome: &FetchOutcome) -> StatusCode {
    match outcome {
        FetchOutcome::Applied => StatusCode::OK,
        FetchOutcome::Failed(_) => StatusCode::BAD_GATEWAY,
        FetchOutcome::Stale => StatusCode::CONFLICT,
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn current_state(State(state): State<AppState>) -> Json<StateView> {
    Json(state_view(&state))
}

async fn movies(State(state): State<AppState>) -> Json<Vec<MovieCard>> {
    let listing = state.search.snapshot().listing;
    Json(state.cards(&listing))
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    text: String,
}

async fn set_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> (StatusCode, Json<StateView>) {
    state.search.set_query(&body.text);
    (StatusCode::ACCEPTED, Json(state_view(&state)))
}

#[derive(Debug, Deserialize)]
struct PageBody {
    page: u32,
}

async fn go_to_page(
    State(state): State<AppState>,
    Json(body): Json<PageBody>,
) -> (StatusCode, Json<StateView>) {
    let outcome = state.search.go_to_page(body.page).await;
    (outcome_status(&outcome), Json(state_view(&state)))
}

#[derive(Debug, Deserialize)]
struct RateBody {
    movie_id: MovieId,
    value: f32,
}

#[derive(Debug, Serialize)]
struct RateView {
    movie_id: MovieId,
    value: f32,
    ratings: RatingState,
}

async fn rate(State(state): State<AppState>, Json(body): Json<RateBody>) -> Json<RateView> {
    let value = rating::normalize_rating(body.value);
    // The push runs detached; its outcome never reaches the caller.
    let _ = state.ratings.rate(body.movie_id, value);
    Json(RateView {
        movie_id: body.movie_id,
        value,
        ratings: state.ratings.snapshot(),
    })
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RatedView {
    #[serde(flatten)]
    listing: ListingState,
    banner: Option<Banner>,
    cards: Vec<MovieCard>,
}

async fn rated(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> (StatusCode, Json<RatedView>) {
    let outcome = state.rated.load(params.page.unwrap_or(1)).await;
    let listing = state.rated.snapshot();
    let view = RatedView {
        banner: Banner::for_listing(&listing),
        cards: state.cards(&listing),
        listing,
    };
    (outcome_status(&outcome), Json(view))
}

async fn genres(State(state): State<AppState>) -> Json<GenreMap> {
    Json(state.session.genres())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
