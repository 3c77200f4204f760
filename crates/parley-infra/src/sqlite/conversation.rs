//! SQLite conversation store implementation.
//!
//! Implements `ConversationStore` and `StoreTransaction` from `parley-core`
//! using sqlx with split read/write pools. Follows the usual repository
//! shape: raw queries, private Row structs, reads on the reader pool and
//! writes on the writer pool.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, Transaction};

use parley_core::chat::history::HistoryRow;
use parley_core::chat::repository::{ConversationStore, StoreTransaction};
use parley_types::conversation::{MessageContent, Role, Session, SessionSummary};
use parley_types::error::StoreError;

use super::error::store_error;
use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationStore`.
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: DatabasePool,
}

impl SqliteConversationStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

const SESSION_COLUMNS: &str = "id, title, session_token, is_limited, created_at, updated_at";

struct SessionRow {
    id: i64,
    title: Option<String>,
    session_token: String,
    is_limited: bool,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            session_token: row.try_get("session_token")?,
            is_limited: row.try_get("is_limited")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<Session, StoreError> {
        Ok(Session {
            id: self.id,
            title: self.title.filter(|t| !t.is_empty()),
            session_token: self.session_token,
            is_limited: self.is_limited,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct SummaryRow {
    id: i64,
    title: Option<String>,
    session_token: String,
    last_message_at: String,
}

impl SummaryRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            session_token: row.try_get("session_token")?,
            last_message_at: row.try_get("last_message_at")?,
        })
    }

    fn into_summary(self) -> Result<SessionSummary, StoreError> {
        Ok(SessionSummary {
            id: self.id,
            title: self.title.filter(|t| !t.is_empty()),
            session_token: self.session_token,
            last_message_at: parse_datetime(&self.last_message_at)?,
        })
    }
}

struct JoinedRow {
    content_id: Option<i64>,
    role: Option<String>,
    part_id: Option<i64>,
    text: Option<String>,
    inline_data_id: Option<i64>,
    media_type: Option<String>,
    data: Option<Vec<u8>>,
}

impl JoinedRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            content_id: row.try_get("content_id")?,
            role: row.try_get("role")?,
            part_id: row.try_get("part_id")?,
            text: row.try_get("text")?,
            inline_data_id: row.try_get("inline_data_id")?,
            media_type: row.try_get("media_type")?,
            data: row.try_get("data")?,
        })
    }

    fn into_history_row(self) -> Result<HistoryRow, StoreError> {
        let role = self
            .role
            .as_deref()
            .map(str::parse::<Role>)
            .transpose()
            .map_err(StoreError::Query)?;
        Ok(HistoryRow {
            content_id: self.content_id,
            role,
            part_id: self.part_id,
            text: self.text,
            inline_data_id: self.inline_data_id,
            media_type: self.media_type,
            data: self.data,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamp, so lexical order is chronological order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    format_datetime(&Utc::now())
}

const HISTORY_SQL: &str = r#"
    SELECT c.id AS content_id, c.role AS role,
           p.id AS part_id, p.text AS text,
           d.id AS inline_data_id, d.media_type AS media_type, d.data AS data
    FROM session s
    LEFT JOIN content c ON c.session_id = s.id
    LEFT JOIN part p ON p.content_id = c.id
    LEFT JOIN inline_data d ON d.part_id = p.id
    WHERE s.id = ?
    ORDER BY p.created_at, p.id, d.id"#;

async fn fetch_history<'e, E>(executor: E, session_id: i64) -> Result<Vec<HistoryRow>, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(HISTORY_SQL)
        .bind(session_id)
        .fetch_all(executor)
        .await
        .map_err(store_error)?;

    rows.iter()
        .map(|row| {
            JoinedRow::from_row(row)
                .map_err(store_error)?
                .into_history_row()
        })
        .collect()
}

async fn fetch_session<'e, E>(executor: E, session_id: i64) -> Result<Option<Session>, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {SESSION_COLUMNS} FROM session WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(session_id)
        .fetch_optional(executor)
        .await
        .map_err(store_error)?;

    match row {
        Some(row) => Ok(Some(
            SessionRow::from_row(&row).map_err(store_error)?.into_session()?,
        )),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Session deletion
// ---------------------------------------------------------------------------

/// One delete statement of a session cascade. Row sets are resolved up
/// front, so the steps do not depend on each other's results and may run
/// in any order within the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CascadeStep {
    InlineData(Vec<i64>),
    Parts(Vec<i64>),
    Contents(i64),
    Session(i64),
}

impl CascadeStep {
    async fn run(&self, conn: &mut SqliteConnection) -> Result<u64, StoreError> {
        let result = match self {
            CascadeStep::InlineData(part_ids) => {
                if part_ids.is_empty() {
                    return Ok(0);
                }
                let mut builder = delete_in("DELETE FROM inline_data WHERE part_id IN (", part_ids);
                builder.build().execute(&mut *conn).await
            }
            CascadeStep::Parts(content_ids) => {
                if content_ids.is_empty() {
                    return Ok(0);
                }
                let mut builder = delete_in("DELETE FROM part WHERE content_id IN (", content_ids);
                builder.build().execute(&mut *conn).await
            }
            CascadeStep::Contents(session_id) => {
                sqlx::query("DELETE FROM content WHERE session_id = ?")
                    .bind(session_id)
                    .execute(&mut *conn)
                    .await
            }
            CascadeStep::Session(session_id) => {
                sqlx::query("DELETE FROM session WHERE id = ?")
                    .bind(session_id)
                    .execute(&mut *conn)
                    .await
            }
        };
        result.map(|r| r.rows_affected()).map_err(store_error)
    }
}

fn delete_in<'a>(prefix: &str, ids: &'a [i64]) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(prefix);
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    builder
}

impl SqliteConversationStore {
    /// Delete a session running its cascade steps in the order `arrange`
    /// leaves them.
    pub(crate) async fn delete_session_with(
        &self,
        session_id: i64,
        arrange: impl FnOnce(&mut Vec<CascadeStep>),
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM session WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        if exists.is_none() {
            return Ok(false);
        }

        let content_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM content WHERE session_id = ?")
                .bind(session_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(store_error)?;
        let part_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT p.id FROM part p JOIN content c ON c.id = p.content_id WHERE c.session_id = ?",
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_error)?;

        let mut steps = vec![
            CascadeStep::InlineData(part_ids),
            CascadeStep::Parts(content_ids),
            CascadeStep::Contents(session_id),
            CascadeStep::Session(session_id),
        ];
        arrange(&mut steps);

        for step in &steps {
            let removed = step.run(&mut tx).await?;
            tracing::trace!(?step, removed, "cascade step");
        }

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ConversationStore implementation
// ---------------------------------------------------------------------------

impl ConversationStore for SqliteConversationStore {
    type Tx = SqliteTransaction;

    async fn begin(&self) -> Result<SqliteTransaction, StoreError> {
        let tx = self.pool.writer.begin().await.map_err(store_error)?;
        Ok(SqliteTransaction { tx })
    }

    async fn history_rows(&self, session_id: i64) -> Result<Vec<HistoryRow>, StoreError> {
        fetch_history(&self.pool.reader, session_id).await
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<Session>, StoreError> {
        fetch_session(&self.pool.reader, session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT s.id, s.title, s.session_token, MAX(p.created_at) AS last_message_at
               FROM session s
               JOIN content c ON c.session_id = s.id
               JOIN part p ON p.content_id = c.id
               GROUP BY s.id
               ORDER BY last_message_at DESC, s.id DESC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(store_error)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let summary_row = SummaryRow::from_row(row).map_err(store_error)?;
            sessions.push(summary_row.into_summary()?);
        }

        Ok(sessions)
    }

    async fn last_session_id(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM session")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(store_error)
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool, StoreError> {
        self.delete_session_with(session_id, |_| {}).await
    }

    async fn rename_session(&self, session_id: i64, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE session SET title = ? WHERE id = ?")
            .bind(title)
            .bind(session_id)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fill_title(&self, session_id: i64, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE session SET title = ? WHERE id = ? AND (title IS NULL OR title = '')",
        )
        .bind(title)
        .bind(session_id)
        .execute(&self.pool.writer)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn lock_session(&self, session_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE session SET is_limited = 1 WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// StoreTransaction implementation
// ---------------------------------------------------------------------------

/// A write transaction on the single writer connection.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction for SqliteTransaction {
    async fn find_session(&mut self, session_id: i64) -> Result<Option<Session>, StoreError> {
        if session_id <= 0 {
            return Ok(None);
        }
        fetch_session(&mut *self.tx, session_id).await
    }

    async fn truncate_from(&mut self, session_id: i64, from: i64) -> Result<u64, StoreError> {
        sqlx::query(
            r#"DELETE FROM inline_data WHERE part_id IN (
                   SELECT p.id FROM part p JOIN content c ON c.id = p.content_id
                   WHERE c.session_id = ? AND c.id >= ?)"#,
        )
        .bind(session_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;

        sqlx::query(
            "DELETE FROM part WHERE content_id IN (SELECT id FROM content WHERE session_id = ? AND id >= ?)",
        )
        .bind(session_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;

        let result = sqlx::query("DELETE FROM content WHERE session_id = ? AND id >= ?")
            .bind(session_id)
            .bind(from)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected())
    }

    async fn history_rows(&mut self, session_id: i64) -> Result<Vec<HistoryRow>, StoreError> {
        fetch_history(&mut *self.tx, session_id).await
    }

    async fn create_session(&mut self, token: &str) -> Result<i64, StoreError> {
        let ts = now();
        let result = sqlx::query(
            "INSERT INTO session (session_token, is_limited, created_at, updated_at) VALUES (?, 0, ?, ?)",
        )
        .bind(token)
        .bind(&ts)
        .bind(&ts)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn rotate_token(&mut self, session_id: i64, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE session SET session_token = ? WHERE id = ?")
            .bind(token)
            .bind(session_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_turn(
        &mut self,
        session_id: i64,
        role: Role,
        content: &MessageContent,
    ) -> Result<i64, StoreError> {
        let content_id = sqlx::query("INSERT INTO content (session_id, role) VALUES (?, ?)")
            .bind(session_id)
            .bind(role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?
            .last_insert_rowid();

        let part_id =
            sqlx::query("INSERT INTO part (content_id, text, created_at) VALUES (?, ?, ?)")
                .bind(content_id)
                .bind(&content.text)
                .bind(now())
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?
                .last_insert_rowid();

        for attachment in &content.attachments {
            sqlx::query("INSERT INTO inline_data (part_id, media_type, data) VALUES (?, ?, ?)")
                .bind(part_id)
                .bind(&attachment.media_type)
                .bind(&attachment.data)
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;
        }

        Ok(content_id)
    }

    async fn touch_session(&mut self, session_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE session SET updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(session_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_error)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_error)
    }
}
