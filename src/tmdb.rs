use crate::config::Config;
use crate::models::{Genre, GenreMap, MovieId, MoviePage, PageEnvelope};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TmdbError {
    /// The request never produced a response (offline, DNS, timeout).
    #[error("network error: {0}")]
    Network(String),
    #[error("TMDB error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected TMDB response: {0}")]
    Decode(String),
    /// Anything else reqwest rejects, such as a malformed base URL or a
    /// redirect loop.
    #[error("TMDB request could not be made: {0}")]
    Request(String),
    #[error("{0} is not configured")]
    MissingCredential(&'static str),
}

impl TmdbError {
    pub fn is_offline(&self) -> bool {
        matches!(self, TmdbError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TmdbError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TmdbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TmdbError::Decode(err.to_string())
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            TmdbError::Network(err.to_string())
        } else {
            TmdbError::Request(err.to_string())
        }
    }
}

pub type TmdbResult<T> = Result<T, TmdbError>;

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_movies(&self, query: &str, page: u32) -> TmdbResult<MoviePage>;
    async fn fetch_popular(&self, page: u32) -> TmdbResult<MoviePage>;
    async fn fetch_genres(&self) -> TmdbResult<GenreMap>;
    async fn create_guest_session(&self) -> TmdbResult<String>;
    async fn rate_movie(&self, movie_id: MovieId, value: f32, session: &str) -> TmdbResult<()>;
    async fn fetch_rated_movies(&self, session: &str, page: u32) -> TmdbResult<MoviePage>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    language: String,
    access_token: Option<String>,
    api_key: Option<String>,
}

impl TmdbClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let user_agent = format!("cinesearch/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            language: config.language.clone(),
            access_token: config.access_token.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Appends the v3 key; guest-session endpoints reject bearer-only calls.
    fn url_with_key(&self, path: &str) -> TmdbResult<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(TmdbError::MissingCredential("TMDB_API_KEY"))?;
        let separator = if path.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}api_key={}", self.base_url, path, separator, key))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> TmdbResult<T> {
        let mut req = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json;charset=utf-8");
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(TmdbError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| TmdbError::Decode(e.to_string()))
    }

    async fn get_page(&self, url: &str, page: u32) -> TmdbResult<MoviePage> {
        let envelope: PageEnvelope = self.send(Method::GET, url, None).await?;
        Ok(envelope.into_page(page))
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_movies(&self, query: &str, page: u32) -> TmdbResult<MoviePage> {
        if query.is_empty() {
            return Ok(MoviePage::empty(page));
        }
        let url = self.url(&format!(
            "/search/movie?include_adult=false&language={}&page={}&query={}",
            self.language,
            page,
            urlencoding::encode(query)
        ));
        debug!(query, page, "TMDB search");
        self.get_page(&url, page).await
    }

    async fn fetch_popular(&self, page: u32) -> TmdbResult<MoviePage> {
        let url = self.url(&format!("/movie/popular?language={}&page={}", self.language, page));
        debug!(page, "TMDB popular listing");
        self.get_page(&url, page).await
    }

    async fn fetch_genres(&self) -> TmdbResult<GenreMap> {
        #[derive(Deserialize)]
        struct GenreResponse {
            #[serde(default)]
            genres: Vec<Genre>,
        }

        let url = self.url(&format!("/genre/movie/list?language={}", self.language));
        let data: GenreResponse = self.send(Method::GET, &url, None).await?;
        Ok(data.genres.into_iter().map(|g| (g.id, g.name)).collect())
    }

    async fn create_guest_session(&self) -> TmdbResult<String> {
        #[derive(Deserialize)]
        struct GuestSession {
            guest_session_id: Option<String>,
        }

        let url = self.url_with_key("/authentication/guest_session/new")?;
        let data: GuestSession = self.send(Method::GET, &url, None).await?;
        data.guest_session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TmdbError::Decode("guest_session_id missing".to_string()))
    }

    async fn rate_movie(&self, movie_id: MovieId, value: f32, session: &str) -> TmdbResult<()> {
        let url = self.url_with_key(&format!(
            "/movie/{movie_id}/rating?guest_session_id={}",
            urlencoding::encode(session)
        ))?;
        let _: serde_json::Value = self
            .send(Method::POST, &url, Some(json!({ "value": value })))
            .await?;
        Ok(())
    }

    async fn fetch_rated_movies(&self, session: &str, page: u32) -> TmdbResult<MoviePage> {
        if session.is_empty() {
            return Ok(MoviePage::empty(page));
        }
        let url = self.url_with_key(&format!(
            "/guest_session/{}/rated/movies?page={}&sort_by=created_at.asc",
            urlencoding::encode(session),
            page
        ))?;
        match self.get_page(&url, page).await {
            // Fresh guest sessions answer 404 until something has been rated.
            Err(TmdbError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(MoviePage::empty(page))
            }
            other => other,
        }
    }
}
