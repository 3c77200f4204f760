//! Classification of sqlx errors into [`StoreError`].
//!
//! Contention is recognized from SQLite's primary result code, never from
//! the message text.

use parley_types::error::StoreError;

/// `SQLITE_BUSY`
const SQLITE_BUSY: i32 = 5;
/// `SQLITE_LOCKED`
const SQLITE_LOCKED: i32 = 6;

/// Whether an extended SQLite result code has a busy/locked primary code.
fn is_busy_code(code: i32) -> bool {
    matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)
}

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let busy = db
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .is_some_and(is_busy_code);
            if busy {
                StoreError::Busy(db.message().to_string())
            } else {
                StoreError::Query(err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Busy(err.to_string()),
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Query(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_code(5));
        assert!(is_busy_code(6));
        // SQLITE_BUSY_SNAPSHOT, SQLITE_LOCKED_SHAREDCACHE
        assert!(is_busy_code(517));
        assert!(is_busy_code(262));
        // SQLITE_CONSTRAINT_FOREIGNKEY
        assert!(!is_busy_code(787));
    }

    #[test]
    fn test_pool_timeout_is_busy() {
        assert!(store_error(sqlx::Error::PoolTimedOut).is_busy());
        assert_eq!(store_error(sqlx::Error::RowNotFound), StoreError::NotFound);
    }

    #[tokio::test]
    async fn test_locked_database_is_busy() {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("lock.db").display());
        let opts = SqliteConnectOptions::from_str(&url)
            .unwrap()
            .busy_timeout(Duration::from_millis(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let mut holder = pool.acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *holder)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(store_error(err).is_busy());

        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
    }
}
