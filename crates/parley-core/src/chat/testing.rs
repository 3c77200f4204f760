//! In-memory fakes of the ports, shared by the unit tests of this module.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use parley_types::backend::{GenerateContentRequest, GenerateContentResponse};
use parley_types::conversation::{MessageContent, Role, Session, SessionSummary};
use parley_types::error::{BackendError, MintError, RelayError, StoreError};

use crate::backend::{BackendClient, BackendResponse, ByteStream};
use crate::chat::history::HistoryRow;
use crate::chat::relay::TextSink;
use crate::chat::repository::{ConversationStore, StoreTransaction};
use crate::token::TokenMinter;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ContentRec {
    id: i64,
    session_id: i64,
    role: Role,
}

#[derive(Debug, Clone)]
struct PartRec {
    id: i64,
    content_id: i64,
    text: String,
}

#[derive(Debug, Clone)]
struct InlineRec {
    id: i64,
    part_id: i64,
    media_type: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct State {
    last_id: i64,
    sessions: BTreeMap<i64, Session>,
    contents: Vec<ContentRec>,
    parts: Vec<PartRec>,
    inline: Vec<InlineRec>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Rows in reverse storage order, to exercise order-independence.
    fn history_rows(&self, session_id: i64) -> Vec<HistoryRow> {
        if !self.sessions.contains_key(&session_id) {
            return Vec::new();
        }
        let mut rows = Vec::new();
        for content in self.contents.iter().filter(|c| c.session_id == session_id) {
            let base = HistoryRow {
                content_id: Some(content.id),
                role: Some(content.role),
                ..Default::default()
            };
            let parts: Vec<&PartRec> = self
                .parts
                .iter()
                .filter(|p| p.content_id == content.id)
                .collect();
            if parts.is_empty() {
                rows.push(base);
                continue;
            }
            for part in parts {
                let with_part = HistoryRow {
                    part_id: Some(part.id),
                    text: Some(part.text.clone()),
                    ..base.clone()
                };
                let blobs: Vec<&InlineRec> =
                    self.inline.iter().filter(|d| d.part_id == part.id).collect();
                if blobs.is_empty() {
                    rows.push(with_part);
                    continue;
                }
                for blob in blobs {
                    rows.push(HistoryRow {
                        inline_data_id: Some(blob.id),
                        media_type: Some(blob.media_type.clone()),
                        data: Some(blob.data.clone()),
                        ..with_part.clone()
                    });
                }
            }
        }
        if rows.is_empty() {
            rows.push(HistoryRow::default());
        }
        rows.reverse();
        rows
    }

    fn remove_contents(&mut self, content_ids: &[i64]) {
        let part_ids: Vec<i64> = self
            .parts
            .iter()
            .filter(|p| content_ids.contains(&p.content_id))
            .map(|p| p.id)
            .collect();
        self.inline.retain(|d| !part_ids.contains(&d.part_id));
        self.parts.retain(|p| !part_ids.contains(&p.id));
        self.contents.retain(|c| !content_ids.contains(&c.id));
    }
}

#[derive(Debug, Default)]
struct Faults {
    busy_appends: AtomicU32,
    busy_commits: AtomicU32,
    busy_updates: AtomicU32,
    model_append_error: Mutex<Option<StoreError>>,
    touch_error: Mutex<Option<StoreError>>,
    commit_error: Mutex<Option<StoreError>>,
    begins: AtomicU32,
}

/// Take one unit from a fault counter, if any is left.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn busy() -> StoreError {
    StoreError::Busy("database is locked".into())
}

/// Store with snapshot transactions: a transaction works on a copy of the
/// state that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    /// Make the next `n` `append_turn` calls fail with `Busy`.
    pub fn fail_next_appends(&self, n: u32) {
        self.faults.busy_appends.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail with `Busy`.
    pub fn fail_next_commits(&self, n: u32) {
        self.faults.busy_commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` single-statement session writes (rename, title,
    /// lock, delete) fail with `Busy`.
    pub fn fail_next_updates(&self, n: u32) {
        self.faults.busy_updates.store(n, Ordering::SeqCst);
    }

    /// Make every model-turn append fail with `err`.
    pub fn fail_model_appends_with(&self, err: StoreError) {
        *self.faults.model_append_error.lock().unwrap() = Some(err);
    }

    /// Make every `touch_session` fail with `err`.
    pub fn fail_touches_with(&self, err: StoreError) {
        *self.faults.touch_error.lock().unwrap() = Some(err);
    }

    /// Make every commit fail with `err`.
    pub fn fail_commits_with(&self, err: StoreError) {
        *self.faults.commit_error.lock().unwrap() = Some(err);
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn begin_count(&self) -> u32 {
        self.faults.begins.load(Ordering::SeqCst)
    }

    /// Total rows across content, part and inline data.
    pub fn row_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.contents.len() + state.parts.len() + state.inline.len()
    }
}

impl ConversationStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        self.faults.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            working: self.state.lock().unwrap().clone(),
            shared: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
        })
    }

    async fn history_rows(&self, session_id: i64) -> Result<Vec<HistoryRow>, StoreError> {
        Ok(self.state.lock().unwrap().history_rows(session_id))
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<Session>, StoreError> {
        Ok(self.state.lock().unwrap().sessions.get(&session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<SessionSummary> = state
            .sessions
            .values()
            .filter(|s| {
                state.contents.iter().any(|c| {
                    c.session_id == s.id && state.parts.iter().any(|p| p.content_id == c.id)
                })
            })
            .map(|s| SessionSummary {
                id: s.id,
                title: s.title.clone(),
                session_token: s.session_token.clone(),
                last_message_at: s.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(summaries)
    }

    async fn last_session_id(&self) -> Result<i64, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool, StoreError> {
        if take(&self.faults.busy_updates) {
            return Err(busy());
        }
        let mut state = self.state.lock().unwrap();
        if state.sessions.remove(&session_id).is_none() {
            return Ok(false);
        }
        let ids: Vec<i64> = state
            .contents
            .iter()
            .filter(|c| c.session_id == session_id)
            .map(|c| c.id)
            .collect();
        state.remove_contents(&ids);
        Ok(true)
    }

    async fn rename_session(&self, session_id: i64, title: &str) -> Result<bool, StoreError> {
        if take(&self.faults.busy_updates) {
            return Err(busy());
        }
        let mut state = self.state.lock().unwrap();
        Ok(match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.title = Some(title.to_string());
                true
            }
            None => false,
        })
    }

    async fn fill_title(&self, session_id: i64, title: &str) -> Result<bool, StoreError> {
        if take(&self.faults.busy_updates) {
            return Err(busy());
        }
        let mut state = self.state.lock().unwrap();
        Ok(match state.sessions.get_mut(&session_id) {
            Some(session) if session.title.is_none() => {
                session.title = Some(title.to_string());
                true
            }
            _ => false,
        })
    }

    async fn lock_session(&self, session_id: i64) -> Result<bool, StoreError> {
        if take(&self.faults.busy_updates) {
            return Err(busy());
        }
        let mut state = self.state.lock().unwrap();
        Ok(match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.is_limited = true;
                true
            }
            None => false,
        })
    }
}

pub struct MemoryTx {
    working: State,
    shared: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl StoreTransaction for MemoryTx {
    async fn find_session(&mut self, session_id: i64) -> Result<Option<Session>, StoreError> {
        if session_id <= 0 {
            return Ok(None);
        }
        Ok(self.working.sessions.get(&session_id).cloned())
    }

    async fn truncate_from(&mut self, session_id: i64, from: i64) -> Result<u64, StoreError> {
        let ids: Vec<i64> = self
            .working
            .contents
            .iter()
            .filter(|c| c.session_id == session_id && c.id >= from)
            .map(|c| c.id)
            .collect();
        self.working.remove_contents(&ids);
        Ok(ids.len() as u64)
    }

    async fn history_rows(&mut self, session_id: i64) -> Result<Vec<HistoryRow>, StoreError> {
        Ok(self.working.history_rows(session_id))
    }

    async fn create_session(&mut self, token: &str) -> Result<i64, StoreError> {
        let id = self.working.next_id();
        let now = Utc::now();
        self.working.sessions.insert(
            id,
            Session {
                id,
                title: None,
                session_token: token.to_string(),
                is_limited: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn rotate_token(&mut self, session_id: i64, token: &str) -> Result<(), StoreError> {
        let session = self
            .working
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound)?;
        session.session_token = token.to_string();
        Ok(())
    }

    async fn append_turn(
        &mut self,
        session_id: i64,
        role: Role,
        content: &MessageContent,
    ) -> Result<i64, StoreError> {
        if take(&self.faults.busy_appends) {
            return Err(busy());
        }
        if role == Role::Model {
            if let Some(err) = self.faults.model_append_error.lock().unwrap().clone() {
                return Err(err);
            }
        }

        let content_id = self.working.next_id();
        self.working.contents.push(ContentRec {
            id: content_id,
            session_id,
            role,
        });
        let part_id = self.working.next_id();
        self.working.parts.push(PartRec {
            id: part_id,
            content_id,
            text: content.text.clone(),
        });
        for attachment in &content.attachments {
            let id = self.working.next_id();
            self.working.inline.push(InlineRec {
                id,
                part_id,
                media_type: attachment.media_type.clone(),
                data: attachment.data.clone(),
            });
        }
        Ok(content_id)
    }

    async fn touch_session(&mut self, session_id: i64) -> Result<(), StoreError> {
        if let Some(err) = self.faults.touch_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(session) = self.working.sessions.get_mut(&session_id) {
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        if take(&self.faults.busy_commits) {
            return Err(busy());
        }
        if let Some(err) = self.faults.commit_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.shared.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// One scripted answer to `send`.
#[derive(Debug, Clone)]
pub enum Scripted {
    Stream(Vec<Result<String, BackendError>>),
    Document(String),
    Fail(BackendError),
}

const DEFAULT_ANSWER: &str = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"ok"}]}}]}"#;

#[derive(Debug, Default)]
struct BackendInner {
    script: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<GenerateContentRequest>>,
    title: Mutex<Option<String>>,
    generate_calls: AtomicU32,
}

/// Backend answering from a script, then with a fixed "ok" document.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    inner: Arc<BackendInner>,
}

impl FakeBackend {
    pub fn script(self, answer: Scripted) -> Self {
        self.inner.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn with_title(self, title: &str) -> Self {
        *self.inner.title.lock().unwrap() = Some(title.to_string());
        self
    }

    pub fn sent(&self) -> Vec<GenerateContentRequest> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> u32 {
        self.inner.generate_calls.load(Ordering::SeqCst)
    }
}

impl BackendClient for FakeBackend {
    async fn send(&self, request: &GenerateContentRequest) -> Result<BackendResponse, BackendError> {
        self.inner.sent.lock().unwrap().push(request.clone());
        let next = self.inner.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Stream(chunks)) => Ok(BackendResponse::Streaming(sse_stream(chunks))),
            Some(Scripted::Document(body)) => Ok(BackendResponse::Complete(body.into_bytes())),
            Some(Scripted::Fail(err)) => Err(err),
            None => Ok(BackendResponse::Complete(DEFAULT_ANSWER.as_bytes().to_vec())),
        }
    }

    async fn generate(
        &self,
        _request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError> {
        self.inner.generate_calls.fetch_add(1, Ordering::SeqCst);
        let title = self
            .inner
            .title
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "Generated title".to_string());
        let body = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": title}]}}]
        });
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Byte stream yielding each chunk as one read.
pub fn sse_stream(chunks: Vec<Result<String, BackendError>>) -> ByteStream {
    Box::pin(futures_util::stream::iter(
        chunks.into_iter().map(|c| c.map(String::into_bytes)),
    ))
}

/// One complete SSE frame carrying `text`.
pub fn text_frame(text: &str) -> String {
    let fragment = serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    });
    format!("data: {fragment}\n\n")
}

// ---------------------------------------------------------------------------
// Minter and sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeMinter {
    minted: AtomicU32,
    fail: bool,
}

impl FakeMinter {
    pub fn failing() -> Self {
        Self {
            minted: AtomicU32::new(0),
            fail: true,
        }
    }
}

impl TokenMinter for FakeMinter {
    fn mint(&self) -> Result<String, MintError> {
        if self.fail {
            return Err(MintError::Encryption);
        }
        let n = self.minted.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-{n}"))
    }
}

/// Collects output; a discard drops the texts of the aborted attempt.
#[derive(Debug, Default)]
pub struct VecSink {
    pub session: Option<i64>,
    pub texts: Vec<String>,
    pub discards: u32,
}

impl TextSink for VecSink {
    async fn open(&mut self, session_id: i64) -> Result<(), RelayError> {
        self.session = Some(session_id);
        Ok(())
    }

    async fn push(&mut self, text: &str) -> Result<(), RelayError> {
        self.texts.push(text.to_string());
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), RelayError> {
        self.discards += 1;
        self.texts.clear();
        Ok(())
    }
}

/// A sink whose receiver is already gone.
#[derive(Debug)]
pub struct FailingSink;

impl TextSink for FailingSink {
    async fn open(&mut self, _session_id: i64) -> Result<(), RelayError> {
        Err(RelayError::SinkClosed)
    }

    async fn push(&mut self, _text: &str) -> Result<(), RelayError> {
        Err(RelayError::SinkClosed)
    }

    async fn discard(&mut self) -> Result<(), RelayError> {
        Err(RelayError::SinkClosed)
    }
}
