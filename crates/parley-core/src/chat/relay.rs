//! Streaming relay: forwards backend text to the caller while accumulating
//! it for persistence.
//!
//! Streamed responses are server-sent events whose `data` field holds one
//! `GenerateContentResponse` fragment. Frames that fail to parse (keep-alives,
//! comments, garbage) are skipped. A transport failure stops the relay, but
//! whatever was accumulated up to that point stays in the [`Accumulator`].

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use parley_types::backend::GenerateContentResponse;
use parley_types::error::RelayError;

use crate::backend::{BackendResponse, ByteStream};

/// Receives relayed output in real time.
pub trait TextSink: Send {
    /// Called once per cycle, before any text, with the final session id.
    fn open(
        &mut self,
        session_id: i64,
    ) -> impl std::future::Future<Output = Result<(), RelayError>> + Send;

    /// Forward one text fragment.
    fn push(&mut self, text: &str)
    -> impl std::future::Future<Output = Result<(), RelayError>> + Send;

    /// Everything received since the last `open` belongs to a rolled-back
    /// attempt; the cycle is about to run again from the start.
    fn discard(&mut self) -> impl std::future::Future<Output = Result<(), RelayError>> + Send;
}

/// Events emitted by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Session(i64),
    Text(String),
    Discard,
}

/// A sink backed by a bounded channel. A dropped receiver surfaces as
/// [`RelayError::SinkClosed`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkEvent>) -> Self {
        Self { tx }
    }
}

impl TextSink for ChannelSink {
    async fn open(&mut self, session_id: i64) -> Result<(), RelayError> {
        self.tx
            .send(SinkEvent::Session(session_id))
            .await
            .map_err(|_| RelayError::SinkClosed)
    }

    async fn push(&mut self, text: &str) -> Result<(), RelayError> {
        self.tx
            .send(SinkEvent::Text(text.to_string()))
            .await
            .map_err(|_| RelayError::SinkClosed)
    }

    async fn discard(&mut self) -> Result<(), RelayError> {
        self.tx
            .send(SinkEvent::Discard)
            .await
            .map_err(|_| RelayError::SinkClosed)
    }
}

/// Text collected for one write cycle. Owned by a single request.
#[derive(Debug, Default)]
pub struct Accumulator {
    buf: String,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Relay either kind of backend response.
pub async fn relay<S: TextSink>(
    response: BackendResponse,
    sink: &mut S,
    acc: &mut Accumulator,
) -> Result<(), RelayError> {
    match response {
        BackendResponse::Streaming(stream) => relay_stream(stream, sink, acc).await,
        BackendResponse::Complete(body) => relay_document(&body, sink, acc).await,
    }
}

/// Relay an event stream fragment by fragment.
///
/// Text is added to the accumulator before it is pushed, so a sink failure
/// never loses text the backend already produced.
pub async fn relay_stream<S: TextSink>(
    stream: ByteStream,
    sink: &mut S,
    acc: &mut Accumulator,
) -> Result<(), RelayError> {
    let mut events = stream.eventsource();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(e)) => return Err(RelayError::Read(e.to_string())),
            Err(e) => {
                debug!(error = %e, "skipping malformed event frame");
                continue;
            }
        };

        let fragment: GenerateContentResponse = match serde_json::from_str(&event.data) {
            Ok(fragment) => fragment,
            Err(e) => {
                trace!(error = %e, data = %event.data, "skipping non-fragment event");
                continue;
            }
        };

        for text in fragment.texts() {
            acc.push(text);
            sink.push(text).await?;
        }
    }

    Ok(())
}

/// Relay a complete response document in one step.
pub async fn relay_document<S: TextSink>(
    body: &[u8],
    sink: &mut S,
    acc: &mut Accumulator,
) -> Result<(), RelayError> {
    let doc: GenerateContentResponse =
        serde_json::from_slice(body).map_err(|e| RelayError::Decode(e.to_string()))?;
    for text in doc.texts() {
        acc.push(text);
        sink.push(text).await?;
    }
    Ok(())
}
