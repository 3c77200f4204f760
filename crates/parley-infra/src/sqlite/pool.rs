//! SQLite connection pools.
//!
//! SQLite admits one writer at a time, so `DatabasePool` pairs a read-only
//! pool for queries with a single-connection pool that every write goes
//! through. A write cycle keeps that connection for as long as the backend
//! streams, so callers queue on it rather than fail fast: the queue limit
//! is derived from the backend request timeout.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use parley_types::config::BackendConfig;

/// Readers allowed at once.
const MAX_READERS: u32 = 8;

/// Lock wait inside SQLite itself, per statement.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Queue limit for the write connection when no backend is involved.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Headroom over the backend timeout for the queries of a write cycle.
const WRITE_WAIT_HEADROOM: Duration = Duration::from_secs(30);

/// How long a writer may queue for the write connection.
///
/// A write cycle holds the connection for at most one backend request
/// (bounded by `request_timeout_secs`) plus its own queries.
pub fn write_wait(backend: &BackendConfig) -> Duration {
    Duration::from_secs(backend.request_timeout_secs) + WRITE_WAIT_HEADROOM
}

/// Reader pool and single-connection writer pool over one WAL database.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open with [`DEFAULT_WRITE_WAIT`].
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_write_wait(database_url, DEFAULT_WRITE_WAIT).await
    }

    /// Open the database, run migrations, and let writers queue for up to
    /// `write_wait` before the acquire fails with `PoolTimedOut`.
    pub async fn with_write_wait(
        database_url: &str,
        write_wait: Duration,
    ) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(write_wait)
            .connect_with(options.clone())
            .await?;

        // The reader pool opens read-only, so the schema must exist first.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(MAX_READERS)
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(write_wait_secs = write_wait.as_secs(), "database pools open");
        Ok(Self { reader, writer })
    }
}

/// Database URL for `parley.db` inside the data directory.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/parley.db", data_dir.display())
}
