use crate::error::{StoreError, StoreResult};
use crate::models::Collection;
use rusqlite::Connection;
use tracing::{debug, info};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Creates the cache tables on a fresh database. Safe to call on every start.
pub fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    let version = schema_version(conn)?;
    if version == CURRENT_SCHEMA_VERSION {
        debug!("Cache schema already at version {}", version);
        return Ok(());
    }
    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "database schema version {} is newer than supported version {}",
            version, CURRENT_SCHEMA_VERSION
        )));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;
    for collection in Collection::ALL {
        tx.execute_batch(&movie_table_sql(collection))?;
    }
    tx.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![CURRENT_SCHEMA_VERSION, crate::models::now_millis()],
    )?;
    tx.commit()?;

    info!("Initialized cache schema version {}", CURRENT_SCHEMA_VERSION);
    Ok(())
}

fn schema_version(conn: &Connection) -> StoreResult<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(0);
    }
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

// Nested lists live in JSON text columns; `position` keeps first-insert order
// stable across upserts.
fn movie_table_sql(collection: Collection) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            position INTEGER NOT NULL,
            title TEXT,
            original_title TEXT,
            overview TEXT,
            tagline TEXT,
            poster_path TEXT,
            backdrop_path TEXT,
            release_date TEXT,
            rating REAL,
            vote_count INTEGER NOT NULL DEFAULT 0,
            runtime INTEGER NOT NULL DEFAULT 0,
            genres TEXT NOT NULL DEFAULT '[]',
            production_companies TEXT NOT NULL DEFAULT '[]',
            spoken_languages TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT '',
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}(timestamp);",
        table = collection.table()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_all_tables_once() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        for collection in Collection::ALL {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [collection.table()],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {}", collection.table());
        }
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (2, 0)",
            [],
        )
        .unwrap();
        let err = initialize_schema(&conn).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }
}
