use thiserror::Error;

/// Errors from the conversation store (used by trait definitions in parley-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The database reported the resource as busy or locked.
    /// Retryable by the turn writer.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("entity not found")]
    NotFound,

    #[error("query error: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

/// Errors from the generative backend client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("unexpected content type: '{0}'")]
    UnexpectedContentType(String),
}

impl BackendError {
    /// HTTP status reported by the backend, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while relaying a backend response to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("stream read failed: {0}")]
    Read(String),

    #[error("caller stopped receiving")]
    SinkClosed,

    #[error("failed to decode response document: {0}")]
    Decode(String),
}

/// Errors from the session token minter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MintError {
    #[error("token secret is not configured")]
    MissingSecret,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encryption,

    #[error("key file error: {0}")]
    KeyFile(String),
}

/// The single failure value surfaced by the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("session {0} not found")]
    NotFound(i64),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store stayed busy after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: StoreError },

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("token mint failed: {0}")]
    TokenMint(#[from] MintError),

    /// The model turn was persisted but the relay was cut short.
    #[error("response truncated after {} bytes: {cause}", captured.len())]
    PartialCapture {
        session_id: i64,
        captured: String,
        cause: RelayError,
    },

    /// The relay failed and the model turn could not be persisted either.
    #[error("relay failed: {cause} (model turn not persisted: {persist})")]
    RelayFailed {
        cause: RelayError,
        persist: StoreError,
    },
}

impl ChatError {
    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::Validation(_) => "VALIDATION_ERROR",
            ChatError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            ChatError::Persistence(StoreError::NotFound) => "NOT_FOUND",
            ChatError::Persistence(_) => "PERSISTENCE_ERROR",
            ChatError::Backend(_) => "BACKEND_ERROR",
            ChatError::TokenMint(_) => "TOKEN_ERROR",
            ChatError::PartialCapture { .. } => "PARTIAL_CAPTURE",
            ChatError::RelayFailed { .. } => "RELAY_FAILED",
        }
    }

    /// Split off store contention, the only failure that is retried.
    ///
    /// Returns the busy store error, or gives `self` back unchanged.
    pub fn into_contention(self) -> Result<StoreError, ChatError> {
        match self {
            ChatError::Persistence(e) if e.is_busy() => Ok(e),
            other => Err(other),
        }
    }
}
