use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by the repository to its callers.
#[derive(Debug, Error)]
pub enum MovieError {
    #[error("No internet connection")]
    NetworkUnavailable,

    #[error("Catalog request failed: {0}")]
    RemoteFailure(String),

    /// Nothing cached for the requested id or collection. Callers show an
    /// empty state for this rather than an error state.
    #[error("Nothing cached for this request")]
    CacheMiss,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

impl MovieError {
    pub fn remote(err: anyhow::Error) -> Self {
        MovieError::RemoteFailure(format!("{:#}", err))
    }
}

pub type MovieResult<T> = Result<T, MovieError>;
