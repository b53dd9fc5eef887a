pub mod config;
pub mod connectivity;
pub mod error;
pub mod feed;
pub mod models;
pub mod repository;
pub mod screens;
pub mod search;
pub mod store;
pub mod tmdb;

pub use error::{MovieError, MovieResult, StoreError, StoreResult};
pub use models::{Collection, ListPage, ListingKind, MovieDetail, MovieSummary};
pub use repository::MovieRepository;
