//! JSON bodies of the `/api/generate` endpoint.

use serde::{Deserialize, Serialize};

use crate::chat::ConversationTurn;
use crate::generation::{GenerationError, GenerationRequest, GenerationResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequestBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub previous_messages: Vec<ConversationTurn>,
}

impl GenerateRequestBody {
    pub fn into_request(self) -> Result<GenerationRequest, GenerationError> {
        GenerationRequest::new(self.prompt, self.model, self.previous_messages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponseBody {
    pub image: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&GenerationError> for ErrorBody {
    fn from(error: &GenerationError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Splits a result into the success body or the error to report.
pub fn response_for(result: GenerationResult) -> Result<GenerateResponseBody, GenerationError> {
    if let Some(error) = result.error {
        return Err(error);
    }
    match result.image {
        Some(image) => Ok(GenerateResponseBody {
            image,
            text: result.status,
        }),
        None => Err(GenerationError::NoImage),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ConversationTurn>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ConversationTurn>>::deserialize(deserializer)?.unwrap_or_default())
}
