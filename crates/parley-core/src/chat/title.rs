//! Session title generation.
//!
//! Short messages become the title as-is. Longer ones are summarized by a
//! non-streaming backend call constrained to [`MAX_TITLE_CHARS`] characters.

use parley_types::backend::{Content, GenerateContentRequest, Part};
use parley_types::conversation::Role;
use parley_types::error::BackendError;

use crate::backend::BackendClient;

/// Messages with fewer characters than this are used verbatim.
pub const VERBATIM_TITLE_CHARS: usize = 14;

/// Upper bound on a generated title, in characters.
pub const MAX_TITLE_CHARS: usize = 26;

const TITLE_INSTRUCTION: &str = "Give this text a title of at most 26 characters. \
Reply with the title only, no quotes, no extra words, no trailing newline.";

/// The title for `message` when it is short enough to stand on its own.
pub fn verbatim_title(message: &str) -> Option<String> {
    (message.chars().count() < VERBATIM_TITLE_CHARS).then(|| message.trim().to_string())
}

/// Request asking the backend to title `message`.
pub fn title_request(message: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some(Role::User),
            parts: vec![Part::text(format!("{message}\n\n{TITLE_INSTRUCTION}"))],
        }],
    }
}

/// Trim whitespace and surrounding quotes, keep the first line, and cap the
/// length at [`MAX_TITLE_CHARS`].
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Produce a title for `message`, asking the backend when it is long.
///
/// Uses the first part of the first candidate; an answer without text
/// yields an empty title.
#[tracing::instrument(name = "generate_title", skip(backend, message))]
pub async fn generate_title<B: BackendClient>(
    backend: &B,
    message: &str,
) -> Result<String, BackendError> {
    if let Some(title) = verbatim_title(message) {
        return Ok(title);
    }
    let response = backend.generate(&title_request(message)).await?;
    Ok(clean_title(response.first_text().unwrap_or_default()))
}
