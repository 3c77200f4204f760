//! Rebuilds ordered turns from the flat session/content/part/inline data join.
//!
//! The join produces one row per (part, attachment) pair, so a part with
//! two attachments shows up twice and rows of different turns may arrive
//! interleaved. Reconstruction groups rows into ordered maps keyed by id and
//! emits the result in a final pass, so the output never depends on row
//! arrival order.

use std::collections::BTreeMap;

use parley_types::conversation::{InlineData, Role, Turn, TurnPart};

/// One row of the history join. Every column past the session is nullable
/// because the join is a chain of LEFT JOINs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRow {
    pub content_id: Option<i64>,
    pub role: Option<Role>,
    pub part_id: Option<i64>,
    pub text: Option<String>,
    pub inline_data_id: Option<i64>,
    pub media_type: Option<String>,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug)]
struct TurnBuilder {
    role: Role,
    /// Attachments keyed by inline data id (insertion order).
    attachments: BTreeMap<i64, InlineData>,
    /// Text parts keyed by part id (insertion order).
    texts: BTreeMap<i64, String>,
}

impl TurnBuilder {
    fn new(role: Role) -> Self {
        Self {
            role,
            attachments: BTreeMap::new(),
            texts: BTreeMap::new(),
        }
    }

    fn into_turn(self, id: i64) -> Turn {
        let mut parts = Vec::with_capacity(self.attachments.len() + self.texts.len());
        parts.extend(self.attachments.into_values().map(TurnPart::InlineData));
        parts.extend(self.texts.into_values().map(TurnPart::Text));
        Turn {
            id,
            role: self.role,
            parts,
        }
    }
}

/// Convert history rows into turns ordered by content id.
///
/// Returns `None` when no row references a turn (unknown session, or a
/// session without turns). Within a turn, attachments come first in
/// insertion order, followed by text parts in insertion order. A part id
/// repeated across rows yields a single text part. Rows without a role are
/// ignored.
pub fn reconstruct(rows: impl IntoIterator<Item = HistoryRow>) -> Option<Vec<Turn>> {
    let mut turns: BTreeMap<i64, TurnBuilder> = BTreeMap::new();

    for row in rows {
        let (Some(content_id), Some(role)) = (row.content_id, row.role) else {
            continue;
        };
        let turn = turns
            .entry(content_id)
            .or_insert_with(|| TurnBuilder::new(role));

        let Some(part_id) = row.part_id else {
            continue;
        };
        turn.texts
            .entry(part_id)
            .or_insert_with(|| row.text.unwrap_or_default());

        if let (Some(inline_id), Some(data)) = (row.inline_data_id, row.data) {
            turn.attachments.entry(inline_id).or_insert_with(|| InlineData {
                media_type: row.media_type.unwrap_or_default(),
                data,
            });
        }
    }

    if turns.is_empty() {
        return None;
    }
    Some(
        turns
            .into_iter()
            .map(|(id, builder)| builder.into_turn(id))
            .collect(),
    )
}
