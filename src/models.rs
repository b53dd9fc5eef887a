use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieSummary {
    pub id: i64,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(rename = "vote_average", default, deserialize_with = "null_as_default")]
    pub rating: f64,
    pub release_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductionCompany {
    pub id: i64,
    pub name: Option<String>,
    pub logo_path: Option<String>,
    pub origin_country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpokenLanguage {
    pub iso_639_1: Option<String>,
    pub english_name: Option<String>,
    pub name: Option<String>,
}

/// Full movie record. This is the row shape of every cache collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieDetail {
    pub id: i64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub tagline: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    #[serde(rename = "vote_average")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vote_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runtime: u32,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub production_companies: Vec<ProductionCompany>,
    #[serde(default)]
    pub spoken_languages: Vec<SpokenLanguage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Epoch milliseconds at which the record was captured.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl MovieDetail {
    /// Builds a cache record from a listing summary. Fields a summary does not
    /// carry are left empty so summary rows share the table with full rows.
    pub fn from_summary(movie: &MovieSummary) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            original_title: movie.title.clone(),
            overview: movie.overview.clone(),
            tagline: Some(String::new()),
            poster_path: movie.poster_path.clone(),
            backdrop_path: movie.backdrop_path.clone(),
            release_date: movie.release_date.clone(),
            rating: Some(movie.rating),
            vote_count: 0,
            runtime: 0,
            genres: Vec::new(),
            production_companies: Vec::new(),
            spoken_languages: Vec::new(),
            status: String::new(),
            timestamp: now_millis(),
        }
    }

    pub fn to_summary(&self) -> MovieSummary {
        MovieSummary {
            id: self.id,
            title: self.title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            rating: self.rating.unwrap_or(0.0),
            release_date: self.release_date.clone(),
        }
    }

    pub fn touched(mut self) -> Self {
        self.timestamp = now_millis();
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ListPage {
    #[serde(rename = "results")]
    pub items: Vec<MovieSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
}

impl ListPage {
    /// Single-page view over a whole cache collection.
    pub fn from_cache(records: &[MovieDetail]) -> Self {
        Self {
            items: records.iter().map(MovieDetail::to_summary).collect(),
            page: 1,
            total_pages: 1,
            total_results: records.len() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Popular,
    NowPlaying,
}

impl ListingKind {
    pub fn collection(self) -> Collection {
        match self {
            ListingKind::Popular => Collection::Popular,
            ListingKind::NowPlaying => Collection::NowPlaying,
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.collection().fmt(f)
    }
}

/// A cache table. Also identifies where a detail screen was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Popular,
    NowPlaying,
    Saved,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Popular, Collection::NowPlaying, Collection::Saved];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Popular => "popular",
            Collection::NowPlaying => "now_playing",
            Collection::Saved => "saved",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Collection::Popular => "popular_movies",
            Collection::NowPlaying => "now_playing_movies",
            Collection::Saved => "saved_movies",
        }
    }

    /// Unknown names map to `None`, which detail lookups treat as absent.
    pub fn parse_source(input: &str) -> Option<Self> {
        input.parse().ok()
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "popular" | "source_popular" => Ok(Collection::Popular),
            "now_playing" | "source_now_playing" => Ok(Collection::NowPlaying),
            "saved" | "source_saved" => Ok(Collection::Saved),
            other => Err(format!("unknown collection '{}'", other)),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// The catalog sends `null` for unknown runtimes and counts.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MovieSummary {
        MovieSummary {
            id: 550,
            title: Some("Fight Club".to_string()),
            overview: Some("An insomniac office worker...".to_string()),
            poster_path: Some("/poster.jpg".to_string()),
            backdrop_path: None,
            rating: 8.4,
            release_date: Some("1999-10-15".to_string()),
        }
    }

    #[test]
    fn summary_rows_default_detail_only_fields() {
        let before = now_millis();
        let detail = MovieDetail::from_summary(&summary());
        assert_eq!(detail.id, 550);
        assert_eq!(detail.original_title.as_deref(), Some("Fight Club"));
        assert_eq!(detail.tagline.as_deref(), Some(""));
        assert_eq!(detail.vote_count, 0);
        assert_eq!(detail.runtime, 0);
        assert!(detail.genres.is_empty());
        assert!(detail.production_companies.is_empty());
        assert!(detail.spoken_languages.is_empty());
        assert_eq!(detail.status, "");
        assert!(detail.timestamp >= before);
        assert_eq!(detail.to_summary(), summary());
    }

    #[test]
    fn cache_page_is_single_page() {
        let rows = vec![
            MovieDetail::from_summary(&summary()),
            MovieDetail::from_summary(&MovieSummary { id: 13, ..summary() }),
        ];
        let page = ListPage::from_cache(&rows);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.total_results, 2);
        assert_eq!(page.items[1].id, 13);
    }

    #[test]
    fn parses_detail_sources() {
        assert_eq!(Collection::parse_source("popular"), Some(Collection::Popular));
        assert_eq!(Collection::parse_source("now-playing"), Some(Collection::NowPlaying));
        assert_eq!(Collection::parse_source("source_saved"), Some(Collection::Saved));
        assert_eq!(Collection::parse_source("search"), None);
    }

    #[test]
    fn missing_rating_projects_to_zero() {
        let mut detail = MovieDetail::from_summary(&summary());
        detail.rating = None;
        assert_eq!(detail.to_summary().rating, 0.0);
    }

    #[test]
    fn detail_deserializes_from_catalog_json() {
        let raw = r#"{
            "id": 603,
            "title": "The Matrix",
            "original_title": "The Matrix",
            "overview": "Set in the 22nd century...",
            "tagline": "Welcome to the Real World.",
            "poster_path": "/p.jpg",
            "backdrop_path": null,
            "release_date": "1999-03-30",
            "vote_average": 8.2,
            "vote_count": 24000,
            "runtime": 136,
            "genres": [{"id": 28, "name": "Action"}],
            "production_companies": [{"id": 79, "name": "Village Roadshow", "logo_path": null, "origin_country": "US"}],
            "spoken_languages": [{"iso_639_1": "en", "english_name": "English", "name": "English"}],
            "status": "Released"
        }"#;
        let detail: MovieDetail = serde_json::from_str(raw).unwrap();
        assert_eq!(detail.runtime, 136);
        assert_eq!(detail.genres[0].name, "Action");
        assert_eq!(detail.spoken_languages[0].iso_639_1.as_deref(), Some("en"));
        assert!(detail.timestamp > 0);
    }

    #[test]
    fn null_runtime_reads_as_zero() {
        let raw = r#"{"id": 1, "title": "Unreleased", "runtime": null, "vote_count": null, "status": null}"#;
        let detail: MovieDetail = serde_json::from_str(raw).unwrap();
        assert_eq!(detail.runtime, 0);
        assert_eq!(detail.vote_count, 0);
        assert_eq!(detail.status, "");
        assert_eq!(detail.rating, None);
    }

    #[test]
    fn null_vote_average_keeps_the_page() {
        let raw = r#"{"page": 1, "results": [{"id": 9, "title": "New", "vote_average": null}], "total_pages": 1, "total_results": 1}"#;
        let page: ListPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.items[0].rating, 0.0);
    }
}
