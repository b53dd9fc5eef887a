use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TMDB_BASE: &str = "https://api.themoviedb.org/3";
const DEFAULT_DB_PATH: &str = "moviesmania.db";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq)]
pub enum TmdbAuth {
    /// v4 read access token, sent as `Authorization: Bearer ...`.
    Bearer(String),
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_base_url: String,
    pub tmdb_auth: TmdbAuth,
    pub request_timeout: Duration,
    pub db_path: PathBuf,
    pub force_offline: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tmdb_auth = match (get("TMDB_ACCESS_TOKEN"), get("TMDB_API_KEY")) {
            (Some(token), _) => TmdbAuth::Bearer(token),
            (None, Some(key)) => TmdbAuth::ApiKey(key),
            (None, None) => {
                return Err(anyhow!(
                    "Missing required environment variable: TMDB_ACCESS_TOKEN or TMDB_API_KEY"
                ))
            }
        };

        let request_timeout = match get("TMDB_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("TMDB_TIMEOUT_SECS is not a number: '{}'", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let force_offline = get("MOVIES_OFFLINE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            tmdb_base_url: get("TMDB_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_TMDB_BASE.to_string()),
            tmdb_auth,
            request_timeout,
            db_path: get("MOVIES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            force_offline,
        })
    }
}
