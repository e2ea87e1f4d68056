use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Items per page on every TMDB list endpoint.
pub const PAGE_SIZE: u32 = 20;

pub type MovieId = u64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre_ids: Vec<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vote_average: f32,
    /// Only present on the guest session's rated list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

pub type GenreMap = BTreeMap<u32, String>;

/// One normalised page of results. `total_pages` is never below 1.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MoviePage {
    pub page: u32,
    pub results: Vec<Movie>,
    pub total_pages: u32,
    pub total_results: u32,
}

impl MoviePage {
    pub fn empty(page: u32) -> Self {
        Self {
            page,
            results: Vec::new(),
            total_pages: 1,
            total_results: 0,
        }
    }
}

/// Raw list envelope as TMDB sends it. Every field may be missing.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct PageEnvelope {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub results: Option<Vec<Movie>>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_results: Option<u32>,
}

impl PageEnvelope {
    pub fn into_page(self, requested: u32) -> MoviePage {
        let results = self.results.unwrap_or_default();
        MoviePage {
            page: self.page.filter(|p| *p > 0).unwrap_or(requested),
            total_pages: normalize_total_pages(self.total_pages),
            total_results: self.total_results.unwrap_or(results.len() as u32),
            results,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn normalize_total_pages(total: Option<u32>) -> u32 {
    match total {
        Some(n) if n > 0 => n,
        _ => 1,
    }
}
