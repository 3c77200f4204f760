//! One-shot chat from the command line.
//!
//! Text is printed as it streams; the full answer is already stored by the
//! time the command returns.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;

use parley_core::chat::relay::TextSink;
use parley_types::conversation::{InlineData, MessageContent, TurnRequest};
use parley_types::error::{ChatError, RelayError};
use parley_types::media::is_supported;

use crate::state::AppState;

/// Prints streamed text to stdout as it arrives.
struct StdoutSink {
    quiet: bool,
    session_id: Option<i64>,
}

impl TextSink for StdoutSink {
    async fn open(&mut self, session_id: i64) -> Result<(), RelayError> {
        self.session_id = Some(session_id);
        if !self.quiet {
            print!("\n  {} ", style("model").cyan().bold());
            let _ = std::io::stdout().flush();
        }
        Ok(())
    }

    async fn push(&mut self, text: &str) -> Result<(), RelayError> {
        if !self.quiet {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), RelayError> {
        if !self.quiet {
            println!();
            println!(
                "  {}",
                style("(database busy, asking again; ignore the text above)").dim()
            );
        }
        Ok(())
    }
}

/// Media type for an attachment, from its file extension.
fn media_type_for(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .with_context(|| format!("'{}' has no file extension", path.display()))?;

    let candidate = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "md" | "markdown" => "text/md".to_string(),
        "txt" => "text/plain".to_string(),
        "htm" | "html" => "text/html".to_string(),
        "js" => "application/x-javascript".to_string(),
        "py" => "application/x-python".to_string(),
        "pdf" => "application/pdf".to_string(),
        "mp3" => "audio/mp3".to_string(),
        "3gp" => "video/3gpp".to_string(),
        other => ["image", "video", "audio", "text"]
            .iter()
            .map(|top| format!("{top}/{other}"))
            .find(|t| is_supported(t))
            .with_context(|| format!("unsupported attachment type '.{other}'"))?,
    };
    Ok(candidate)
}

async fn read_attachment(path: &Path) -> Result<InlineData> {
    let media_type = media_type_for(path)?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(InlineData::new(media_type, data))
}

/// Send one message and stream the reply to stdout.
///
/// # Examples
///
/// ```bash
/// parley chat "what is in this picture?" --attach cat.png
/// parley chat "and its color?" --session 4
/// parley chat "try again" --session 4 --edit-from 9
/// ```
pub async fn send_message(
    state: &AppState,
    message: String,
    session_id: Option<i64>,
    edit_from: Option<i64>,
    attachments: &[std::path::PathBuf],
    model: Option<&str>,
    json: bool,
) -> Result<()> {
    if let Some(alias) = model {
        if state.chat_service.backend().switch_model(alias).is_none() {
            bail!("Unknown model '{alias}'");
        }
    }

    let mut files = Vec::with_capacity(attachments.len());
    for path in attachments {
        files.push(read_attachment(path).await?);
    }

    let request = TurnRequest {
        session_id: session_id.unwrap_or(0),
        content: MessageContent::with_attachments(message, files),
        edit_from,
    };

    let mut sink = StdoutSink {
        quiet: json,
        session_id: None,
    };
    let result = state.chat_service.submit_turn(request, &mut sink).await;
    if !json && sink.session_id.is_some() {
        println!();
        println!();
    }

    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "  {}",
                    style(format!("session {}", outcome.session_id)).dim()
                );
            }
            Ok(())
        }
        Err(ChatError::PartialCapture {
            session_id, cause, ..
        }) => {
            eprintln!(
                "  {} Reply cut short ({cause}); what arrived was saved to session {session_id}",
                style("!").yellow().bold()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
