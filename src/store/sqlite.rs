use super::schema::initialize_schema;
use super::MovieStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{Collection, MovieDetail};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

type SharedConnection = Arc<Mutex<Connection>>;

const COLUMNS: &str = "id, title, original_title, overview, tagline, poster_path, backdrop_path, \
     release_date, rating, vote_count, runtime, genres, production_companies, spoken_languages, \
     status, timestamp";

/// Owns the SQLite file and exactly one store per cache table.
pub struct Database {
    popular: Arc<SqliteMovieStore>,
    now_playing: Arc<SqliteMovieStore>,
    saved: Arc<SqliteMovieStore>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("SQLite journal mode: {}", mode);
        info!("Opened movie cache at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        initialize_schema(&conn)?;
        let shared: SharedConnection = Arc::new(Mutex::new(conn));
        Ok(Self {
            popular: Arc::new(SqliteMovieStore::new(Collection::Popular, shared.clone())?),
            now_playing: Arc::new(SqliteMovieStore::new(Collection::NowPlaying, shared.clone())?),
            saved: Arc::new(SqliteMovieStore::new(Collection::Saved, shared)?),
        })
    }

    pub fn store(&self, collection: Collection) -> Arc<SqliteMovieStore> {
        match collection {
            Collection::Popular => self.popular.clone(),
            Collection::NowPlaying => self.now_playing.clone(),
            Collection::Saved => self.saved.clone(),
        }
    }
}

pub struct SqliteMovieStore {
    collection: Collection,
    conn: SharedConnection,
    feed: watch::Sender<Vec<MovieDetail>>,
}

impl SqliteMovieStore {
    fn new(collection: Collection, conn: SharedConnection) -> StoreResult<Self> {
        let initial = {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            select_all(&guard, collection)?
        };
        let (feed, _) = watch::channel(initial);
        Ok(Self {
            collection,
            conn,
            feed,
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // The snapshot is taken and published while the lock is still held, so
    // observers see snapshots in commit order. Once `op` has committed the
    // write stands; a failed re-read only leaves observers on the previous
    // snapshot.
    fn mutate<F>(&self, op: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Connection) -> StoreResult<()>,
    {
        let mut conn = self.lock()?;
        op(&mut *conn)?;
        match select_all(&*conn, self.collection) {
            Ok(snapshot) => {
                self.feed.send_replace(snapshot);
            }
            Err(e) => warn!(
                collection = %self.collection,
                "Committed, but could not refresh observers: {}", e
            ),
        }
        Ok(())
    }
}

impl MovieStore for SqliteMovieStore {
    fn replace_all(&self, records: &[MovieDetail]) -> StoreResult<()> {
        let table = self.collection.table();
        self.mutate(|conn| {
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM {table}"), [])?;
            for record in records {
                upsert_row(&tx, table, record)?;
            }
            tx.commit()?;
            Ok(())
        })?;
        debug!(collection = %self.collection, count = records.len(), "Replaced collection");
        Ok(())
    }

    fn upsert(&self, record: &MovieDetail) -> StoreResult<()> {
        let table = self.collection.table();
        self.mutate(|conn| upsert_row(conn, table, record))
    }

    fn upsert_many(&self, records: &[MovieDetail]) -> StoreResult<()> {
        let table = self.collection.table();
        self.mutate(|conn| {
            let tx = conn.transaction()?;
            for record in records {
                upsert_row(&tx, table, record)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn delete(&self, id: i64) -> StoreResult<()> {
        let table = self.collection.table();
        self.mutate(|conn| {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
            Ok(())
        })
    }

    fn clear(&self) -> StoreResult<()> {
        let table = self.collection.table();
        self.mutate(|conn| {
            conn.execute(&format!("DELETE FROM {table}"), [])?;
            Ok(())
        })
    }

    fn get(&self, id: i64) -> StoreResult<Option<MovieDetail>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE id = ?1",
            self.collection.table()
        );
        let row = conn
            .query_row(&sql, params![id], row_to_detail)
            .optional()?;
        row.transpose()
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.collection.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn exists(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1 LIMIT 1)",
                self.collection.table()
            ),
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn observe_all(&self) -> watch::Receiver<Vec<MovieDetail>> {
        self.feed.subscribe()
    }
}

fn upsert_row(conn: &Connection, table: &str, record: &MovieDetail) -> StoreResult<()> {
    let genres = serde_json::to_string(&record.genres)?;
    let companies = serde_json::to_string(&record.production_companies)?;
    let languages = serde_json::to_string(&record.spoken_languages)?;

    conn.execute(
        &format!(
            "INSERT INTO {table} (
                id, position, title, original_title, overview, tagline, poster_path,
                backdrop_path, release_date, rating, vote_count, runtime, genres,
                production_companies, spoken_languages, status, timestamp
            ) VALUES (
                ?1, (SELECT COALESCE(MAX(position), 0) + 1 FROM {table}), ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
            )
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                original_title = excluded.original_title,
                overview = excluded.overview,
                tagline = excluded.tagline,
                poster_path = excluded.poster_path,
                backdrop_path = excluded.backdrop_path,
                release_date = excluded.release_date,
                rating = excluded.rating,
                vote_count = excluded.vote_count,
                runtime = excluded.runtime,
                genres = excluded.genres,
                production_companies = excluded.production_companies,
                spoken_languages = excluded.spoken_languages,
                status = excluded.status,
                timestamp = excluded.timestamp"
        ),
        params![
            record.id,
            record.title,
            record.original_title,
            record.overview,
            record.tagline,
            record.poster_path,
            record.backdrop_path,
            record.release_date,
            record.rating,
            record.vote_count,
            record.runtime,
            genres,
            companies,
            languages,
            record.status,
            record.timestamp,
        ],
    )?;
    Ok(())
}

fn select_all(conn: &Connection, collection: Collection) -> StoreResult<Vec<MovieDetail>> {
    let order = match collection {
        Collection::Saved => "timestamp DESC, position DESC",
        Collection::Popular | Collection::NowPlaying => "position ASC",
    };
    let sql = format!(
        "SELECT {COLUMNS} FROM {} ORDER BY {order}",
        collection.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_detail)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().collect()
}

// JSON decoding happens outside rusqlite's error type so a corrupt column
// surfaces as a serialization error.
fn row_to_detail(row: &Row) -> rusqlite::Result<StoreResult<MovieDetail>> {
    let genres: String = row.get("genres")?;
    let companies: String = row.get("production_companies")?;
    let languages: String = row.get("spoken_languages")?;

    let base = MovieDetail {
        id: row.get("id")?,
        title: row.get("title")?,
        original_title: row.get("original_title")?,
        overview: row.get("overview")?,
        tagline: row.get("tagline")?,
        poster_path: row.get("poster_path")?,
        backdrop_path: row.get("backdrop_path")?,
        release_date: row.get("release_date")?,
        rating: row.get("rating")?,
        vote_count: row.get("vote_count")?,
        runtime: row.get("runtime")?,
        genres: Vec::new(),
        production_companies: Vec::new(),
        spoken_languages: Vec::new(),
        status: row.get("status")?,
        timestamp: row.get("timestamp")?,
    };

    Ok(with_lists(base, &genres, &companies, &languages))
}

fn with_lists(
    base: MovieDetail,
    genres: &str,
    companies: &str,
    languages: &str,
) -> StoreResult<MovieDetail> {
    Ok(MovieDetail {
        genres: serde_json::from_str(genres)?,
        production_companies: serde_json::from_str(companies)?,
        spoken_languages: serde_json::from_str(languages)?,
        ..base
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, MovieSummary, ProductionCompany, SpokenLanguage};

    fn detail(id: i64, title: &str) -> MovieDetail {
        MovieDetail::from_summary(&MovieSummary {
            id,
            title: Some(title.to_string()),
            overview: Some(format!("{title} overview")),
            poster_path: Some(format!("/{id}.jpg")),
            backdrop_path: None,
            rating: 7.5,
            release_date: Some("2024-05-01".to_string()),
        })
    }

    fn full_detail(id: i64) -> MovieDetail {
        MovieDetail {
            tagline: Some("Every ending is a beginning".to_string()),
            vote_count: 1234,
            runtime: 118,
            genres: vec![Genre {
                id: 18,
                name: "Drama".to_string(),
            }],
            production_companies: vec![ProductionCompany {
                id: 4,
                name: Some("Paramount".to_string()),
                logo_path: Some("/logo.png".to_string()),
                origin_country: Some("US".to_string()),
            }],
            spoken_languages: vec![SpokenLanguage {
                iso_639_1: Some("en".to_string()),
                english_name: Some("English".to_string()),
                name: Some("English".to_string()),
            }],
            status: "Released".to_string(),
            ..detail(id, "Full")
        }
    }

    #[test]
    fn upsert_then_get_returns_same_record() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        let record = full_detail(42);

        store.upsert(&record).unwrap();

        assert_eq!(store.get(42).unwrap(), Some(record));
        assert_eq!(store.get(43).unwrap(), None);
    }

    #[test]
    fn upsert_replaces_whole_record() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::NowPlaying);
        store.upsert(&full_detail(7)).unwrap();

        let replacement = detail(7, "Replacement");
        store.upsert(&replacement).unwrap();

        let stored = store.get(7).unwrap().unwrap();
        assert_eq!(stored, replacement);
        assert!(stored.genres.is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn replace_all_count_matches_regardless_of_prior_state() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        store
            .replace_all(&[detail(1, "A"), detail(2, "B"), detail(3, "C")])
            .unwrap();
        assert_eq!(store.count().unwrap(), 3);

        store.replace_all(&[detail(9, "Z")]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(!store.exists(1).unwrap());
        assert!(store.exists(9).unwrap());

        store.replace_all(&[]).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn delete_unknown_id_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Saved);
        store.upsert(&detail(5, "Kept")).unwrap();

        store.delete(99).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        store.delete(5).unwrap();
        assert!(!store.exists(5).unwrap());
    }

    #[test]
    fn collections_are_independent() {
        let db = Database::open_in_memory().unwrap();
        db.store(Collection::Popular).upsert(&detail(1, "A")).unwrap();

        assert!(db.store(Collection::Popular).exists(1).unwrap());
        assert!(!db.store(Collection::NowPlaying).exists(1).unwrap());
        assert!(!db.store(Collection::Saved).exists(1).unwrap());

        db.store(Collection::NowPlaying).clear().unwrap();
        assert_eq!(db.store(Collection::Popular).count().unwrap(), 1);
    }

    #[test]
    fn listing_order_survives_upserts() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        store
            .replace_all(&[detail(30, "C"), detail(10, "A"), detail(20, "B")])
            .unwrap();

        store.upsert(&full_detail(30)).unwrap();

        let ids: Vec<i64> = store.observe_all().borrow().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn saved_feed_is_most_recent_first() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Saved);
        store
            .upsert(&MovieDetail {
                timestamp: 1_000,
                ..detail(1, "Old")
            })
            .unwrap();
        store
            .upsert(&MovieDetail {
                timestamp: 3_000,
                ..detail(2, "New")
            })
            .unwrap();
        store
            .upsert(&MovieDetail {
                timestamp: 2_000,
                ..detail(3, "Middle")
            })
            .unwrap();

        let ids: Vec<i64> = store.observe_all().borrow().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn observers_see_every_commit_without_resubscribing() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        let mut rx = store.observe_all();
        assert!(rx.borrow_and_update().is_empty());

        store.replace_all(&[detail(1, "A"), detail(2, "B")]).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 2);

        store.delete(1).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        let late = store.observe_all();
        assert_eq!(late.borrow()[0].id, 2);
    }

    #[test]
    fn readers_never_see_a_half_replaced_collection() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        let small: Vec<MovieDetail> = (1..=3).map(|id| detail(id, "Small")).collect();
        let large: Vec<MovieDetail> = (10..20).map(|id| detail(id, "Large")).collect();
        store.replace_all(&small).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for round in 0..200 {
                    let batch = if round % 2 == 0 { &large } else { &small };
                    store.replace_all(batch).unwrap();
                }
            })
        };

        let feed = store.observe_all();
        let mut reads = 0;
        while !writer.is_finished() || reads == 0 {
            let count = store.count().unwrap();
            assert!(count == 3 || count == 10, "count saw {count} rows");
            let seen = feed.borrow().len();
            assert!(seen == 3 || seen == 10, "feed saw {seen} rows");
            reads += 1;
        }
        writer.join().unwrap();
    }

    #[test]
    fn write_stands_when_observer_refresh_fails() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store(Collection::Popular);
        store.upsert(&detail(1, "Corrupt")).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE popular_movies SET genres = 'not json' WHERE id = 1", [])
            .unwrap();

        store.upsert(&detail(2, "Fresh")).unwrap();

        assert!(store.exists(2).unwrap());
        let ids: Vec<i64> = store.observe_all().borrow().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);
        assert!(matches!(store.get(1), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn reopening_file_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let record = full_detail(11);
        {
            let db = Database::open(&path).unwrap();
            db.store(Collection::Saved).upsert(&record).unwrap();
        }
        let db = Database::open(&path).unwrap();
        let saved = db.store(Collection::Saved);
        assert_eq!(saved.get(11).unwrap(), Some(record));
        assert_eq!(saved.observe_all().borrow().len(), 1);
    }
}
