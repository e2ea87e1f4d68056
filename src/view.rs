use crate::listing::{ListingState, Source};
use crate::models::{Movie, MovieId};
use crate::rating::RatingState;
use crate::session::Session;
use chrono::NaiveDate;
use serde::Serialize;

pub const OVERVIEW_LIMIT: usize = 260;
pub const UNKNOWN_DATE: &str = "Unknown date";

/// Cuts `text` to at most `max_len` characters, backing off to the last word
/// boundary, and marks the cut with `" ..."`.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_len).collect();
    if let Some(space) = truncated.rfind(' ') {
        if space > 0 {
            truncated.truncate(space);
        }
    }
    format!("{} ...", truncated)
}

/// `2021-03-05` -> `March 5, 2021`; anything unparsable is shown as-is.
pub fn format_release_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return UNKNOWN_DATE.to_string();
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.format("%B %-d, %Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieCard {
    pub id: MovieId,
    pub title: String,
    pub release_date: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: f32,
    pub user_rating: f32,
}

impl MovieCard {
    pub fn build(movie: &Movie, session: &Session, ratings: &RatingState, image_base: &str) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            release_date: format_release_date(&movie.release_date),
            overview: truncate_text(&movie.overview, OVERVIEW_LIMIT),
            poster_url: movie
                .poster_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| format!("{image_base}{p}")),
            genres: session.genre_names(&movie.genre_ids),
            vote_average: (movie.vote_average * 10.0).round() / 10.0,
            user_rating: ratings.get(&movie.id).copied().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Banner {
    Offline(String),
    Error(String),
    NoResults,
}

impl Banner {
    pub fn for_listing(state: &ListingState) -> Option<Self> {
        if let Some(message) = &state.error {
            return Some(if state.offline {
                Banner::Offline(message.clone())
            } else {
                Banner::Error(message.clone())
            });
        }
        let searched = matches!(&state.source, Some(Source::Search(q)) if !q.is_empty());
        if !state.loading && state.results.is_empty() && searched {
            return Some(Banner::NoResults);
        }
        None
    }
}
