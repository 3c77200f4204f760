//! Wire types for the generative backend's `generateContent` protocol.
//!
//! Requests carry the full conversation as a list of contents, each with a
//! role and ordered parts. Responses (and each streamed fragment) carry
//! candidates whose parts hold the generated text.

use serde::{Deserialize, Serialize};

use crate::conversation::{Role, Turn, TurnPart};

/// Request body for `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// One turn on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A text fragment or an inline attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data,
            }),
        }
    }
}

/// Base64-encoded attachment bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    #[serde(with = "crate::serde_base64")]
    pub data: Vec<u8>,
}

impl From<&TurnPart> for Part {
    fn from(part: &TurnPart) -> Self {
        match part {
            TurnPart::Text(text) => Part::text(text.clone()),
            TurnPart::InlineData(blob) => Part::inline(blob.media_type.clone(), blob.data.clone()),
        }
    }
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        Content {
            role: Some(turn.role),
            parts: turn.parts.iter().map(Part::from).collect(),
        }
    }
}

/// A complete response document, or one streamed fragment of one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Text of every part of every candidate, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
    }

    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InlineData;

    #[test]
    fn test_request_serializes_inline_data_camel_case() {
        let req = GenerateContentRequest {
            contents: vec![Content {
                role: Some(Role::User),
                parts: vec![Part::inline("image/png", vec![0xff]), Part::text("what is this")],
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "/w==");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], "what is this");
    }

    #[test]
    fn test_response_texts_in_order() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.texts().collect::<String>(), "Hello");
        assert_eq!(resp.first_text(), Some("Hel"));
        assert_eq!(resp.usage_metadata.unwrap().total_token_count, 5);
    }

    #[test]
    fn test_response_without_content_has_no_text() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(resp.texts().count(), 0);
        assert!(resp.first_text().is_none());
    }

    #[test]
    fn test_turn_converts_to_content() {
        let turn = Turn {
            id: 7,
            role: Role::Model,
            parts: vec![
                TurnPart::InlineData(InlineData::new("image/jpeg", vec![1])),
                TurnPart::Text("ok".into()),
            ],
        };
        let content = Content::from(&turn);
        assert_eq!(content.role, Some(Role::Model));
        assert_eq!(content.parts.len(), 2);
        assert!(content.parts[0].inline_data.is_some());
        assert_eq!(content.parts[1].text.as_deref(), Some("ok"));
    }
}
