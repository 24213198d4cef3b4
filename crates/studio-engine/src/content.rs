//! `generateContent` response shapes and the helpers that read them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: String,
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
}

/// An image returned inline in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

impl GenerateContentResponse {
    pub fn with_parts(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts,
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            ..Self::default()
        }
    }

    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// First usable inline image among the first candidate's parts.
///
/// This is not a plain "first `inlineData` part wins" scan: a part whose
/// payload is empty does not end the search, so a later part with data is
/// returned instead, and a part with no MIME type is reported as `image/png`.
/// Later candidates are never searched.
pub fn first_inline_image(response: &GenerateContentResponse) -> Option<InlineImage> {
    response.first_parts().iter().find_map(|part| {
        let inline = part.inline_data.as_ref()?;
        let data = inline.data.trim();
        if data.is_empty() {
            return None;
        }
        let mime_type = inline.mime_type.trim();
        Some(InlineImage {
            mime_type: if mime_type.is_empty() {
                DEFAULT_IMAGE_MIME.to_string()
            } else {
                mime_type.to_string()
            },
            data: data.to_string(),
        })
    })
}

/// Concatenated text of the first candidate.
pub fn response_text(response: &GenerateContentResponse) -> String {
    response
        .first_parts()
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect()
}
