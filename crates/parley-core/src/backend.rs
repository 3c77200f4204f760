//! BackendClient trait definition.
//!
//! The generative backend either streams its answer as server-sent events
//! or returns one complete JSON document. The client only reports which one
//! it got; decoding belongs to the relay.

use std::pin::Pin;

use futures_util::Stream;

use parley_types::backend::{GenerateContentRequest, GenerateContentResponse};
use parley_types::error::BackendError;

/// Raw body chunks of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send + 'static>>;

/// What the backend sent back for a dispatched request.
pub enum BackendResponse {
    /// An event stream, still being produced.
    Streaming(ByteStream),
    /// One fully formed response document.
    Complete(Vec<u8>),
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendResponse::Streaming(_) => f.write_str("Streaming(..)"),
            BackendResponse::Complete(body) => write!(f, "Complete({} bytes)", body.len()),
        }
    }
}

/// Trait for the generative backend client.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in parley-infra (e.g., `GeminiClient`).
pub trait BackendClient: Send + Sync {
    /// Dispatch a conversation. Transport failures and non-success statuses
    /// are returned as errors; the body is left to the caller.
    fn send(
        &self,
        request: &GenerateContentRequest,
    ) -> impl std::future::Future<Output = Result<BackendResponse, BackendError>> + Send;

    /// Send a one-off, non-streaming request and decode the answer.
    fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> impl std::future::Future<Output = Result<GenerateContentResponse, BackendError>> + Send;
}
