//! Transactional turn writer.
//!
//! One write cycle looks up (or creates) the session, optionally truncates
//! history for an edit, rebuilds prior turns, persists the user turn,
//! dispatches to the backend, relays the answer and persists it as the
//! model turn. The whole cycle runs in a single store transaction and is
//! retried from scratch when the store reports contention.

use std::time::Duration;

use tracing::{debug, info, warn};

use parley_types::config::WriterConfig;
use parley_types::conversation::{MessageContent, Role, TurnOutcome, TurnRequest};
use parley_types::error::{ChatError, RelayError, StoreError};

use crate::backend::BackendClient;
use crate::chat::history::reconstruct;
use crate::chat::payload::build_request;
use crate::chat::relay::{Accumulator, TextSink, relay};
use crate::chat::repository::{ConversationStore, StoreTransaction};
use crate::token::TokenMinter;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded, fixed-delay retry on store contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WriterConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Handle the failure of attempt number `attempt`.
    ///
    /// Contention with attempts left sleeps for `delay` and returns `Ok`, so
    /// the caller goes again. Anything else comes back as the final error.
    pub async fn backoff(&self, attempt: u32, err: ChatError) -> Result<(), ChatError> {
        let busy = err.into_contention()?;
        if attempt >= self.max_attempts {
            warn!(attempts = attempt, error = %busy, "store still busy, giving up");
            return Err(ChatError::RetriesExhausted {
                attempts: attempt,
                last: busy,
            });
        }
        warn!(attempt, max = self.max_attempts, error = %busy, "store busy, retrying");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    /// Run a single store operation under this policy.
    pub async fn run<R, F, Fut>(&self, mut op: F) -> Result<R, ChatError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => self.backoff(attempt, e.into()).await?,
            }
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// TurnWriter
// ---------------------------------------------------------------------------

/// Result of a cycle whose writes all succeeded.
struct Cycle {
    session_id: i64,
    captured: String,
    relay_error: Option<RelayError>,
}

pub struct TurnWriter<S, B, T> {
    store: S,
    backend: B,
    minter: T,
    policy: RetryPolicy,
}

impl<S, B, T> TurnWriter<S, B, T>
where
    S: ConversationStore,
    B: BackendClient,
    T: TokenMinter,
{
    pub fn new(store: S, backend: B, minter: T, policy: RetryPolicy) -> Self {
        Self {
            store,
            backend,
            minter,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one write cycle, retrying on contention.
    ///
    /// A relay failure after the model turn was persisted is reported as
    /// [`ChatError::PartialCapture`]; the transaction is still committed.
    /// Every other failure rolls back. When a rolled-back attempt already
    /// reached the sink, the sink is told to discard it before the retry.
    #[tracing::instrument(
        name = "submit_turn",
        skip(self, request, sink),
        fields(session_id = request.session_id, edit_from = ?request.edit_from)
    )]
    pub async fn submit<K: TextSink>(
        &self,
        request: &TurnRequest,
        sink: &mut K,
    ) -> Result<TurnOutcome, ChatError> {
        let mut attempt = 1;
        loop {
            let mut opened = false;
            match self.attempt(request, sink, &mut opened).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => self.policy.backoff(attempt, e).await?,
            }
            if opened {
                if let Err(e) = sink.discard().await {
                    debug!(error = %e, "sink gone before retry");
                }
            }
            attempt += 1;
        }
    }

    async fn attempt<K: TextSink>(
        &self,
        request: &TurnRequest,
        sink: &mut K,
        opened: &mut bool,
    ) -> Result<TurnOutcome, ChatError> {
        let mut tx = self.store.begin().await?;

        let cycle = match self.run_cycle(&mut tx, request, sink, opened).await {
            Ok(cycle) => cycle,
            Err(e) => {
                debug!(error = %e, "rolling back turn");
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback failed");
                }
                return Err(e);
            }
        };

        if let Err(persist) = tx.commit().await {
            return Err(match cycle.relay_error {
                Some(cause) => ChatError::RelayFailed { cause, persist },
                None => persist.into(),
            });
        }
        info!(
            session_id = cycle.session_id,
            captured = cycle.captured.len(),
            truncated = cycle.relay_error.is_some(),
            "turn committed"
        );

        match cycle.relay_error {
            None => Ok(TurnOutcome {
                session_id: cycle.session_id,
                captured: cycle.captured,
            }),
            Some(cause) => Err(ChatError::PartialCapture {
                session_id: cycle.session_id,
                captured: cycle.captured,
                cause,
            }),
        }
    }

    async fn run_cycle<K: TextSink>(
        &self,
        tx: &mut S::Tx,
        request: &TurnRequest,
        sink: &mut K,
        opened: &mut bool,
    ) -> Result<Cycle, ChatError> {
        let existing = tx.find_session(request.session_id).await?;

        let history = match &existing {
            Some(session) => {
                if let Some(from) = request.edit_from {
                    let removed = tx.truncate_from(session.id, from).await?;
                    debug!(from, removed, "truncated history for edit");
                }
                reconstruct(tx.history_rows(session.id).await?).unwrap_or_default()
            }
            None => Vec::new(),
        };

        let token = self.minter.mint()?;
        let session_id = match &existing {
            Some(session) => {
                tx.rotate_token(session.id, &token).await?;
                session.id
            }
            None => tx.create_session(&token).await?,
        };

        let payload = build_request(&history, &request.content);
        tx.append_turn(session_id, Role::User, &request.content)
            .await?;

        let response = self.backend.send(&payload).await?;

        let mut acc = Accumulator::new();
        *opened = true;
        let relayed = match sink.open(session_id).await {
            Ok(()) => relay(response, sink, &mut acc).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &relayed {
            warn!(session_id, captured = acc.len(), error = %e, "relay ended early");
        }

        let captured = acc.into_string();
        let persisted = tx
            .append_turn(session_id, Role::Model, &MessageContent::text(captured.clone()))
            .await;

        let persisted = match persisted {
            Ok(_) => tx.touch_session(session_id).await,
            Err(e) => Err(e),
        };

        match (relayed, persisted) {
            (Err(cause), Err(persist)) => Err(ChatError::RelayFailed { cause, persist }),
            (Ok(()), Err(e)) => Err(e.into()),
            (relayed, Ok(())) => Ok(Cycle {
                session_id,
                captured,
                relay_error: relayed.err(),
            }),
        }
    }
}
