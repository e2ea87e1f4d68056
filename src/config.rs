use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w200";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_ADDR: &str = "0.0.0.0:3147";

/// Process-wide settings, read once at startup and handed to the client and
/// coordinators.
#[derive(Clone)]
pub struct Config {
    pub access_token: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub image_base_url: String,
    pub language: String,
    pub debounce: Duration,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Missing credentials
    /// only degrade features; they are reported once here.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_token = non_empty("TMDB_ACCESS_TOKEN");
        if access_token.is_none() {
            warn!("Missing TMDB_ACCESS_TOKEN (v4 token) - read requests will be sent unauthenticated");
        }
        let api_key = non_empty("TMDB_API_KEY");
        if api_key.is_none() {
            warn!("Missing TMDB_API_KEY (v3 key) - guest sessions and ratings are disabled");
        }

        let debounce_ms = match non_empty("SEARCH_DEBOUNCE_MS") {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!("Invalid SEARCH_DEBOUNCE_MS '{}', using {}ms", raw, DEFAULT_DEBOUNCE_MS);
                DEFAULT_DEBOUNCE_MS
            }),
            None => DEFAULT_DEBOUNCE_MS,
        };

        let default_addr: SocketAddr = ([0, 0, 0, 0], 3147).into();
        let bind_addr = match non_empty("CINESEARCH_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid CINESEARCH_ADDR '{}', using {}", raw, DEFAULT_ADDR);
                default_addr
            }),
            None => default_addr,
        };

        let config = Self {
            access_token,
            api_key,
            base_url: non_empty("TMDB_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            image_base_url: non_empty("TMDB_IMAGE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_IMAGE_BASE_URL.to_string()),
            language: non_empty("TMDB_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            debounce: Duration::from_millis(debounce_ms),
            bind_addr,
        };
        info!(
            base_url = %config.base_url,
            debounce_ms,
            ratings_enabled = config.ratings_enabled(),
            "Configuration loaded"
        );
        config
    }

    pub fn ratings_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// Credentials stay out of Debug output so the config can be logged safely.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("access_token", &self.access_token.as_ref().map(|_| "<set>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("base_url", &self.base_url)
            .field("image_base_url", &self.image_base_url)
            .field("language", &self.language)
            .field("debounce", &self.debounce)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::default();
        assert_eq!(config.access_token, None);
        assert!(!config.ratings_enabled());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.bind_addr.port(), 3147);
    }

    #[test]
    fn reads_credentials_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TMDB_ACCESS_TOKEN", "token"),
            ("TMDB_API_KEY", " key "),
            ("TMDB_BASE_URL", "http://127.0.0.1:9000/3/"),
            ("SEARCH_DEBOUNCE_MS", "50"),
            ("CINESEARCH_ADDR", "127.0.0.1:8080"),
        ]));
        assert_eq!(config.access_token.as_deref(), Some("token"));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert!(config.ratings_enabled());
        assert_eq!(config.base_url, "http://127.0.0.1:9000/3");
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn invalid_values_fall_back_and_blank_credentials_are_absent() {
        let config = Config::from_lookup(lookup(&[
            ("TMDB_API_KEY", "   "),
            ("SEARCH_DEBOUNCE_MS", "soon"),
            ("CINESEARCH_ADDR", "nowhere"),
        ]));
        assert_eq!(config.api_key, None);
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_ADDR);
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = Config::from_lookup(lookup(&[("TMDB_API_KEY", "secret-key")]));
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("<set>"));
    }
}
