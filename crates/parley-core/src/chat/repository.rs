//! ConversationStore and StoreTransaction trait definitions.
//!
//! The store exposes read-only queries directly and all writes of a turn
//! cycle through a transaction object. Follows the RPITIT pattern used by
//! every port in this crate.

use parley_types::conversation::{MessageContent, Role, Session, SessionSummary};
use parley_types::error::StoreError;

use crate::chat::history::HistoryRow;

/// Repository trait for session and turn persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteConversationStore`).
/// Implementations must report lock contention as [`StoreError::Busy`]
/// so the turn writer can tell it apart from other failures.
pub trait ConversationStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Begin a write transaction.
    fn begin(&self) -> impl std::future::Future<Output = Result<Self::Tx, StoreError>> + Send;

    /// Flat join of session, content, part and inline data rows for one
    /// session. Empty when the session does not exist.
    fn history_rows(
        &self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryRow>, StoreError>> + Send;

    fn get_session(
        &self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Sessions with at least one part, most recent message first.
    fn list_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionSummary>, StoreError>> + Send;

    /// Highest session id, or 0 when there are no sessions.
    fn last_session_id(&self)
    -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;

    /// Delete a session and every content, part and inline data row under
    /// it. Returns `false` when the session did not exist.
    fn delete_session(
        &self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Overwrite the title. Returns `false` when the session does not exist.
    fn rename_session(
        &self,
        session_id: i64,
        title: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Set the title only if none is set yet. Returns `true` when written.
    fn fill_title(
        &self,
        session_id: i64,
        title: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Mark the session as limited. Returns `false` when it does not exist.
    fn lock_session(
        &self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
}

/// One write transaction. Dropping it without `commit` rolls back.
pub trait StoreTransaction: Send {
    /// Look up a session. Ids `<= 0` never match.
    fn find_session(
        &mut self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Delete every turn of the session whose content id is `>= from`,
    /// with their parts and inline data. Returns the number of turns removed.
    fn truncate_from(
        &mut self,
        session_id: i64,
        from: i64,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Same as [`ConversationStore::history_rows`], inside the transaction.
    fn history_rows(
        &mut self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryRow>, StoreError>> + Send;

    /// Insert a session row and return its id.
    fn create_session(
        &mut self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;

    fn rotate_token(
        &mut self,
        session_id: i64,
        token: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Write one content row, one text part, and one inline data row per
    /// attachment. Returns the content id.
    fn append_turn(
        &mut self,
        session_id: i64,
        role: Role,
        content: &MessageContent,
    ) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;

    /// Bump `updated_at`.
    fn touch_session(
        &mut self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn commit(self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn rollback(self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
