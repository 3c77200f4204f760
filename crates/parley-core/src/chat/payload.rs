//! Outbound request assembly.

use parley_types::backend::{Content, GenerateContentRequest, Part};
use parley_types::conversation::{MessageContent, Role, Turn};

/// Build the backend request from prior turns plus the new user message.
///
/// Prior parts with neither text nor data are dropped, as are turns left
/// without parts. The new turn lists its attachments first and adds a text
/// part only when the message is non-empty; it is omitted entirely when it
/// has no parts at all.
pub fn build_request(history: &[Turn], message: &MessageContent) -> GenerateContentRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .filter_map(|turn| {
            let parts: Vec<Part> = turn
                .parts
                .iter()
                .filter(|p| !p.is_empty())
                .map(Part::from)
                .collect();
            (!parts.is_empty()).then(|| Content {
                role: Some(turn.role),
                parts,
            })
        })
        .collect();

    let mut parts: Vec<Part> = message
        .attachments
        .iter()
        .filter(|a| !a.data.is_empty())
        .map(|a| Part::inline(a.media_type.clone(), a.data.clone()))
        .collect();
    if !message.text.is_empty() {
        parts.push(Part::text(message.text.clone()));
    }
    if !parts.is_empty() {
        contents.push(Content {
            role: Some(Role::User),
            parts,
        });
    }

    GenerateContentRequest { contents }
}
