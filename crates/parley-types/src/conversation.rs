//! Session, turn, and part types for Parley conversations.
//!
//! A session groups an ordered sequence of turns. Each turn is authored by
//! either the user or the model and carries one or more parts: text
//! fragments or binary attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Author of a turn.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'model'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// A conversation thread.
///
/// `title` stays `None` until generated or explicitly edited.
/// `session_token` is rotated on every successful write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub title: Option<String>,
    pub session_token: String,
    pub is_limited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A session as shown in listings: only sessions with at least one part
/// appear, ordered by their latest message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub title: Option<String>,
    pub session_token: String,
    pub last_message_at: DateTime<Utc>,
}

/// One binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    /// Blank until normalized; defaults to `image/jpeg` on submission.
    #[serde(default)]
    pub media_type: String,
    #[serde(with = "crate::serde_base64")]
    pub data: Vec<u8>,
}

impl InlineData {
    pub fn new(media_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// A fragment of a reconstructed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPart {
    Text(String),
    InlineData(InlineData),
}

impl TurnPart {
    /// A part carrying neither text nor attachment bytes.
    pub fn is_empty(&self) -> bool {
        match self {
            TurnPart::Text(text) => text.is_empty(),
            TurnPart::InlineData(blob) => blob.data.is_empty(),
        }
    }
}

/// One turn of a conversation, as rebuilt from storage.
///
/// `id` is the content id; ascending ids are the canonical turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub role: Role,
    pub parts: Vec<TurnPart>,
}

impl Turn {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                TurnPart::Text(t) => Some(t.as_str()),
                TurnPart::InlineData(_) => None,
            })
            .collect()
    }
}

/// The payload written for one turn: a text body plus zero or more
/// attachments. Model turns never carry attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<InlineData>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(text: impl Into<String>, attachments: Vec<InlineData>) -> Self {
        Self {
            text: text.into(),
            attachments,
        }
    }
}

/// A new message submitted to a session.
///
/// `session_id == 0` starts a new session. `edit_from` names the turn at
/// which history is cut before the message is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub session_id: i64,
    pub content: MessageContent,
    #[serde(default)]
    pub edit_from: Option<i64>,
}

impl TurnRequest {
    pub fn new(session_id: i64, content: MessageContent) -> Self {
        Self {
            session_id,
            content,
            edit_from: None,
        }
    }

    pub fn editing(mut self, turn_id: i64) -> Self {
        self.edit_from = Some(turn_id);
        self
    }
}

/// Result of a committed write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: i64,
    /// Model text persisted for this cycle.
    pub captured: String,
}

/// A session title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub session_id: i64,
    pub text: String,
}
