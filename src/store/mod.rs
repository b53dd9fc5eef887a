use crate::error::StoreResult;
use crate::models::MovieDetail;
use tokio::sync::watch;

mod schema;
mod sqlite;

pub use schema::{initialize_schema, CURRENT_SCHEMA_VERSION};
pub use sqlite::{Database, SqliteMovieStore};

/// One keyed cache collection of full movie records.
///
/// Absence is never an error: `get` returns `None`, `delete` of an unknown id
/// is a no-op. Errors only come from the underlying storage.
pub trait MovieStore: Send + Sync {
    /// Clears the collection and inserts `records` as one atomic step.
    fn replace_all(&self, records: &[MovieDetail]) -> StoreResult<()>;

    fn upsert(&self, record: &MovieDetail) -> StoreResult<()>;

    fn upsert_many(&self, records: &[MovieDetail]) -> StoreResult<()>;

    fn delete(&self, id: i64) -> StoreResult<()>;

    fn clear(&self) -> StoreResult<()>;

    fn get(&self, id: i64) -> StoreResult<Option<MovieDetail>>;

    fn count(&self) -> StoreResult<usize>;

    fn exists(&self, id: i64) -> StoreResult<bool>;

    /// Live view of the whole collection. The receiver always holds the
    /// latest committed snapshot and is notified after every mutation.
    fn observe_all(&self) -> watch::Receiver<Vec<MovieDetail>>;
}
