use crate::config::{Config, TmdbAuth};
use crate::models::{ListPage, MovieDetail};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Remote movie catalog. Implementations report transport and decoding
/// problems as errors; the repository decides what to do with them.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn list_popular(&self, page: u32) -> Result<ListPage>;
    async fn list_now_playing(&self, page: u32) -> Result<ListPage>;
    /// `Ok(None)` when the catalog has no movie with this id.
    async fn get_detail(&self, id: i64) -> Result<Option<MovieDetail>>;
    async fn search(&self, query: &str, page: u32) -> Result<ListPage>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    auth: TmdbAuth,
}

impl TmdbClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("building HTTP client failed")?;
        Ok(Self {
            client,
            base_url: config.tmdb_base_url.clone(),
            auth: config.tmdb_auth.clone(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut params: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        if let TmdbAuth::ApiKey(key) = &self.auth {
            params.push(format!("api_key={}", urlencoding::encode(key)));
        }
        if params.is_empty() {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/{}?{}", self.base_url, path, params.join("&"))
        }
    }

    async fn list(&self, path: &str, page: u32) -> Result<ListPage> {
        let url = self.url(path, &[("page", page.to_string())]);
        self.get_json::<ListPage>(&url)
            .await?
            .ok_or_else(|| anyhow!("{} returned 404", path))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Option<T>> {
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if let TmdbAuth::Bearer(token) = &self.auth {
            request = request.bearer_auth(token);
        }

        let res = request.send().await.context("request failed")?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {}: {}", redact(url), status, text));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl CatalogService for TmdbClient {
    async fn list_popular(&self, page: u32) -> Result<ListPage> {
        self.list("movie/popular", page).await
    }

    async fn list_now_playing(&self, page: u32) -> Result<ListPage> {
        self.list("movie/now_playing", page).await
    }

    async fn get_detail(&self, id: i64) -> Result<Option<MovieDetail>> {
        let url = self.url(&format!("movie/{id}"), &[]);
        let detail = self.get_json::<MovieDetail>(&url).await?;
        if detail.is_none() {
            debug!("TMDB has no movie with id {}", id);
        }
        Ok(detail)
    }

    async fn search(&self, query: &str, page: u32) -> Result<ListPage> {
        let url = self.url(
            "search/movie",
            &[("query", query.to_string()), ("page", page.to_string())],
        );
        self.get_json::<ListPage>(&url)
            .await?
            .ok_or_else(|| anyhow!("search/movie returned 404"))
    }
}

fn redact(url: &str) -> String {
    match url.find("api_key=") {
        Some(idx) => {
            let rest = &url[idx..];
            let end = rest.find('&').map(|e| idx + e).unwrap_or(url.len());
            format!("{}api_key=***{}", &url[..idx], &url[end..])
        }
        None => url.to_string(),
    }
}
