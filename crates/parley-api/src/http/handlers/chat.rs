//! SSE streaming chat endpoint.
//!
//! POST /api/v1/chat
//!
//! Runs one write cycle on a spawned task and streams the model's text as
//! Server-Sent Events while the cycle is in flight. Disconnecting does not
//! cancel the cycle: whatever the model produced so far is still stored.
//!
//! SSE event types:
//! - `session` — first event, `{ "session_id": N }`
//! - `text` — one per fragment, `{ "text": "..." }`
//! - `discard` — the store was busy and the cycle restarts; drop every
//!   `text` received so far. A new `session` event follows.
//! - `done` — cycle committed, `{ "session_id": N, "captured_len": N }`
//! - `error` — `{ "code": "...", "message": "...", "session_id": N? }`

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;

use parley_core::chat::relay::{ChannelSink, SinkEvent};
use parley_types::conversation::{InlineData, MessageContent, TurnOutcome, TurnRequest};
use parley_types::error::ChatError;

use crate::state::AppState;

/// Buffered events between the writer task and the HTTP response.
const EVENT_BUFFER: usize = 64;

/// Request body for the streaming chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// Session to continue; 0 or absent starts a new one.
    #[serde(default)]
    pub session_id: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<InlineData>,
    /// Turn to resubmit from; it and everything after it are discarded.
    #[serde(default)]
    pub edit_from: Option<i64>,
}

impl From<ChatRequestBody> for TurnRequest {
    fn from(body: ChatRequestBody) -> Self {
        TurnRequest {
            session_id: body.session_id,
            content: MessageContent::with_attachments(body.message, body.attachments),
            edit_from: body.edit_from,
        }
    }
}

fn session_event(session_id: i64) -> Event {
    Event::default()
        .event("session")
        .data(json!({ "session_id": session_id }).to_string())
}

fn text_event(text: &str) -> Event {
    Event::default()
        .event("text")
        .data(json!({ "text": text }).to_string())
}

fn done_event(outcome: &TurnOutcome) -> Event {
    Event::default().event("done").data(
        json!({
            "session_id": outcome.session_id,
            "captured_len": outcome.captured.len(),
        })
        .to_string(),
    )
}

fn error_event(err: &ChatError) -> Event {
    let mut data = json!({ "code": err.kind(), "message": err.to_string() });
    if let ChatError::PartialCapture { session_id, .. } = err {
        data["session_id"] = json!(session_id);
    }
    Event::default().event("error").data(data.to_string())
}

/// POST /api/v1/chat — submit a turn and stream the answer.
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = TurnRequest::from(body);
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let (result_tx, result_rx) = oneshot::channel();

    let chat_service = state.chat_service.clone();
    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        let result = chat_service.submit_turn(request, &mut sink).await;
        if let Err(ref e) = result {
            tracing::warn!(code = e.kind(), error = %e, "chat turn failed");
        }
        // Dropping the sink closes the event channel before the result is sent.
        drop(sink);
        let _ = result_tx.send(result);
    });

    let sse_stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let event = match event {
                SinkEvent::Session(id) => session_event(id),
                SinkEvent::Text(text) => text_event(&text),
                SinkEvent::Discard => Event::default().event("discard").data("{}"),
            };
            yield Ok::<_, Infallible>(event);
        }

        match result_rx.await {
            Ok(Ok(outcome)) => {
                yield Ok(done_event(&outcome));
            }
            Ok(Err(err)) => {
                yield Ok(error_event(&err));
            }
            Err(_) => {
                let data = json!({ "code": "INTERNAL_ERROR", "message": "chat task aborted" });
                yield Ok(Event::default().event("error").data(data.to_string()));
            }
        }
    };

    Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
