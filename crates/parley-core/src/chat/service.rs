//! Chat service: the facade the API layer talks to.
//!
//! ChatService validates incoming turns, hands them to the TurnWriter, and
//! serves the read-side and session-management operations (history,
//! listing, titles, deletion, the limit flag).

use tracing::{info, warn};

use parley_types::conversation::{Session, SessionSummary, Title, Turn, TurnOutcome, TurnRequest};
use parley_types::error::ChatError;
use parley_types::media::normalize_media_type;

use crate::backend::BackendClient;
use crate::chat::history::reconstruct;
use crate::chat::relay::TextSink;
use crate::chat::repository::ConversationStore;
use crate::chat::title::generate_title;
use crate::chat::writer::{RetryPolicy, TurnWriter};
use crate::token::TokenMinter;

/// Orchestrates the conversation lifecycle.
///
/// Generic over the store, backend and minter ports so that parley-core
/// never depends on parley-infra.
pub struct ChatService<S, B, T> {
    writer: TurnWriter<S, B, T>,
}

impl<S, B, T> ChatService<S, B, T>
where
    S: ConversationStore,
    B: BackendClient,
    T: TokenMinter,
{
    pub fn new(writer: TurnWriter<S, B, T>) -> Self {
        Self { writer }
    }

    /// Access the conversation store.
    pub fn store(&self) -> &S {
        self.writer.store()
    }

    /// Access the backend client.
    pub fn backend(&self) -> &B {
        self.writer.backend()
    }

    /// Retry policy for store contention, shared by turns and the
    /// single-statement session writes.
    fn policy(&self) -> RetryPolicy {
        self.writer.policy()
    }

    // --- Turns ---

    /// Validate and submit a turn, relaying the model's answer to `sink`.
    ///
    /// Attachments without a media type default to `image/jpeg`; unsupported
    /// media types, empty messages, and limited sessions are rejected before
    /// any write happens.
    pub async fn submit_turn<K: TextSink>(
        &self,
        mut request: TurnRequest,
        sink: &mut K,
    ) -> Result<TurnOutcome, ChatError> {
        if request.content.text.trim().is_empty() && request.content.attachments.is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }
        for attachment in &mut request.content.attachments {
            if attachment.data.is_empty() {
                return Err(ChatError::Validation("attachment has no data".to_string()));
            }
            attachment.media_type =
                normalize_media_type(&attachment.media_type).map_err(ChatError::Validation)?;
        }
        if request.edit_from.is_some() && request.session_id <= 0 {
            return Err(ChatError::Validation(
                "editing requires an existing session".to_string(),
            ));
        }
        let limited = self
            .store()
            .get_session(request.session_id)
            .await?
            .is_some_and(|s| s.is_limited);
        if limited {
            return Err(ChatError::Validation(format!(
                "session {} is limited",
                request.session_id
            )));
        }

        self.writer.submit(&request, sink).await
    }

    /// Ordered turns of a session, or `None` when it has none.
    pub async fn get_history(&self, session_id: i64) -> Result<Option<Vec<Turn>>, ChatError> {
        let rows = self.store().history_rows(session_id).await?;
        Ok(reconstruct(rows))
    }

    // --- Sessions ---

    pub async fn get_session(&self, session_id: i64) -> Result<Session, ChatError> {
        self.store()
            .get_session(session_id)
            .await?
            .ok_or(ChatError::NotFound(session_id))
    }

    /// Sessions with messages, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        Ok(self.store().list_sessions().await?)
    }

    pub async fn last_session_id(&self) -> Result<i64, ChatError> {
        Ok(self.store().last_session_id().await?)
    }

    /// Delete a session and all its turns. Id 0 is a no-op.
    pub async fn delete_session(&self, session_id: i64) -> Result<(), ChatError> {
        if session_id <= 0 {
            return Ok(());
        }
        let store = self.store();
        let deleted = self
            .policy()
            .run(|| store.delete_session(session_id))
            .await?;
        if !deleted {
            return Err(ChatError::NotFound(session_id));
        }
        info!(session_id, "session deleted");
        Ok(())
    }

    // --- Titles ---

    /// Rename a session. Unknown sessions (and id 0) are left alone; the
    /// return value says whether anything was written.
    pub async fn edit_title(&self, session_id: i64, title: &str) -> Result<bool, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("title is empty".to_string()));
        }
        if session_id <= 0 {
            return Ok(false);
        }
        let store = self.store();
        let renamed = self
            .policy()
            .run(|| store.rename_session(session_id, title))
            .await?;
        if !renamed {
            warn!(session_id, "attempted to rename non-existent session");
        }
        Ok(renamed)
    }

    /// Title an untitled session from `message`.
    ///
    /// Returns `None` when the session does not exist or already has a title.
    pub async fn generate_title(
        &self,
        session_id: i64,
        message: &str,
    ) -> Result<Option<Title>, ChatError> {
        let Some(session) = self.store().get_session(session_id).await? else {
            return Ok(None);
        };
        if session.title.is_some() {
            return Ok(None);
        }

        let text = generate_title(self.backend(), message).await?;
        let store = self.store();
        let filled = self
            .policy()
            .run(|| store.fill_title(session_id, &text))
            .await?;
        if !filled {
            return Ok(None);
        }
        info!(session_id, title = %text, "session titled");
        Ok(Some(Title { session_id, text }))
    }

    // --- Limit flag ---

    pub async fn lock_session(&self, session_id: i64) -> Result<(), ChatError> {
        let store = self.store();
        let locked = self
            .policy()
            .run(|| store.lock_session(session_id))
            .await?;
        if !locked {
            return Err(ChatError::NotFound(session_id));
        }
        info!(session_id, "session limited");
        Ok(())
    }

    pub async fn is_session_limited(&self, session_id: i64) -> Result<bool, ChatError> {
        Ok(self.get_session(session_id).await?.is_limited)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chat::testing::{FakeBackend, FakeMinter, MemoryStore, VecSink};
    use parley_types::conversation::{InlineData, MessageContent, Role, TurnPart};

    fn service(store: MemoryStore) -> ChatService<MemoryStore, FakeBackend, FakeMinter> {
        service_with(store, FakeBackend::default())
    }

    fn service_with(
        store: MemoryStore,
        backend: FakeBackend,
    ) -> ChatService<MemoryStore, FakeBackend, FakeMinter> {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };
        ChatService::new(TurnWriter::new(
            store,
            backend,
            FakeMinter::default(),
            policy,
        ))
    }

    async fn seed(svc: &ChatService<MemoryStore, FakeBackend, FakeMinter>, text: &str) -> i64 {
        svc.submit_turn(
            TurnRequest::new(0, MessageContent::text(text)),
            &mut VecSink::default(),
        )
        .await
        .unwrap()
        .session_id
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let store = MemoryStore::default();
        let svc = service(store.clone());
        let err = svc
            .submit_turn(
                TurnRequest::new(0, MessageContent::text("   ")),
                &mut VecSink::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
        assert_eq!(store.begin_count(), 0);
    }

    #[tokio::test]
    async fn test_attachment_only_message_is_accepted() {
        let svc = service(MemoryStore::default());
        let request = TurnRequest::new(
            0,
            MessageContent::with_attachments("", vec![InlineData::new("", vec![7])]),
        );
        let outcome = svc
            .submit_turn(request, &mut VecSink::default())
            .await
            .unwrap();

        let turns = svc.get_history(outcome.session_id).await.unwrap().unwrap();
        assert_eq!(
            turns[0].parts[0],
            TurnPart::InlineData(InlineData::new("image/jpeg", vec![7]))
        );
    }

    #[tokio::test]
    async fn test_unsupported_media_type_is_rejected() {
        let svc = service(MemoryStore::default());
        let request = TurnRequest::new(
            0,
            MessageContent::with_attachments("zip?", vec![InlineData::new("application/zip", vec![1])]),
        );
        let err = svc
            .submit_turn(request, &mut VecSink::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(ref m) if m.contains("application/zip")));
    }

    #[tokio::test]
    async fn test_edit_without_session_is_rejected() {
        let svc = service(MemoryStore::default());
        let request = TurnRequest::new(0, MessageContent::text("x")).editing(3);
        let err = svc
            .submit_turn(request, &mut VecSink::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_limited_session_refuses_turns() {
        let svc = service(MemoryStore::default());
        let sid = seed(&svc, "hello").await;
        svc.lock_session(sid).await.unwrap();
        assert!(svc.is_session_limited(sid).await.unwrap());

        let err = svc
            .submit_turn(
                TurnRequest::new(sid, MessageContent::text("more")),
                &mut VecSink::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(ref m) if m.contains("limited")));
    }

    #[tokio::test]
    async fn test_unknown_session_starts_a_new_one() {
        let svc = service(MemoryStore::default());
        let outcome = svc
            .submit_turn(
                TurnRequest::new(9_999, MessageContent::text("anyone there?")),
                &mut VecSink::default(),
            )
            .await
            .unwrap();
        assert_ne!(outcome.session_id, 9_999);
        assert!(svc.get_history(outcome.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lock_unknown_session_is_not_found() {
        let svc = service(MemoryStore::default());
        assert!(matches!(
            svc.lock_session(42).await.unwrap_err(),
            ChatError::NotFound(42)
        ));
        assert!(matches!(
            svc.is_session_limited(42).await.unwrap_err(),
            ChatError::NotFound(42)
        ));
    }

    #[tokio::test]
    async fn test_history_of_unknown_session_is_none() {
        let svc = service(MemoryStore::default());
        assert!(svc.get_history(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_idempotent() {
        let svc = service(MemoryStore::default());
        let sid = seed(&svc, "one").await;
        for text in ["two", "three"] {
            svc.submit_turn(
                TurnRequest::new(sid, MessageContent::text(text)),
                &mut VecSink::default(),
            )
            .await
            .unwrap();
        }

        let first = svc.get_history(sid).await.unwrap().unwrap();
        let second = svc.get_history(sid).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
        assert!(first.windows(2).all(|w| w[0].id < w[1].id));
        let user_texts: Vec<String> = first
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.text())
            .collect();
        assert_eq!(user_texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_delete_session_removes_everything() {
        let store = MemoryStore::default();
        let svc = service(store.clone());
        let sid = seed(&svc, "bye").await;

        svc.delete_session(sid).await.unwrap();

        assert_eq!(store.session_count(), 0);
        assert_eq!(store.row_count(), 0);
        assert!(matches!(
            svc.delete_session(sid).await.unwrap_err(),
            ChatError::NotFound(_)
        ));
        svc.delete_session(0).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_last_session() {
        let svc = service(MemoryStore::default());
        assert_eq!(svc.last_session_id().await.unwrap(), 0);
        let a = seed(&svc, "a").await;
        let b = seed(&svc, "b").await;

        assert_eq!(svc.last_session_id().await.unwrap(), b);
        let ids: Vec<i64> = svc.list_sessions().await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn test_edit_title() {
        let svc = service(MemoryStore::default());
        let sid = seed(&svc, "hello").await;

        assert!(svc.edit_title(sid, " Renamed ").await.unwrap());
        assert_eq!(svc.get_session(sid).await.unwrap().title.as_deref(), Some("Renamed"));
        assert!(!svc.edit_title(0, "ignored").await.unwrap());
        assert!(!svc.edit_title(999, "ignored").await.unwrap());
        assert!(svc.edit_title(sid, "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_title_only_once() {
        let backend = FakeBackend::default().with_title("Rust file IO");
        let svc = service_with(MemoryStore::default(), backend.clone());
        let sid = seed(&svc, "How do I read a file in Rust?").await;

        let title = svc
            .generate_title(sid, "How do I read a file in Rust?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(title.text, "Rust file IO");
        assert_eq!(title.session_id, sid);

        let again = svc.generate_title(sid, "anything else at all").await.unwrap();
        assert!(again.is_none());
        assert_eq!(backend.generate_calls(), 1);

        assert!(svc.generate_title(999, "hi").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_writes_wait_out_contention() {
        let store = MemoryStore::default();
        let svc = service(store.clone());
        let sid = seed(&svc, "How do I read a file in Rust?").await;

        store.fail_next_updates(2);
        assert!(svc.edit_title(sid, "Renamed").await.unwrap());
        store.fail_next_updates(2);
        svc.lock_session(sid).await.unwrap();
        assert!(svc.is_session_limited(sid).await.unwrap());
        store.fail_next_updates(2);
        svc.delete_session(sid).await.unwrap();
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_title_fill_waits_out_contention() {
        let store = MemoryStore::default();
        let svc = service_with(store.clone(), FakeBackend::default().with_title("File IO"));
        let sid = seed(&svc, "How do I read a file in Rust?").await;

        store.fail_next_updates(1);
        let title = svc
            .generate_title(sid, "How do I read a file in Rust?")
            .await
            .unwrap();
        assert_eq!(title.map(|t| t.text).as_deref(), Some("File IO"));
    }

    #[tokio::test]
    async fn test_session_write_contention_is_bounded() {
        let store = MemoryStore::default();
        let svc = service(store.clone());
        let sid = seed(&svc, "hello").await;

        store.fail_next_updates(3);
        let err = svc.lock_session(sid).await.unwrap_err();
        assert_eq!(err.kind(), "RETRIES_EXHAUSTED");
        assert!(!svc.is_session_limited(sid).await.unwrap());
    }
}
