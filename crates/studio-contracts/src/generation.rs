use thiserror::Error;

use crate::chat::{ConversationTurn, GenerationMode};

pub const GENERATED_STATUS: &str = "Image generated successfully!";
pub const MODIFIED_STATUS: &str = "Image modified successfully!";
pub const PROMPT_REQUIRED_MESSAGE: &str = "Prompt is required";
pub const NO_IMAGE_MESSAGE: &str = "Failed to generate image. Please try a different prompt.";
pub const UPSTREAM_FALLBACK_MESSAGE: &str = "An error occurred while generating the image";

/// Failure of one submission. Every variant is a value handed back to the
/// caller; none of them is meant to abort the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),
    #[error("{}", NO_IMAGE_MESSAGE)]
    NoImage,
    #[error("{}", upstream_message(.0))]
    Upstream(String),
}

impl GenerationError {
    pub fn prompt_required() -> Self {
        Self::Validation(PROMPT_REQUIRED_MESSAGE.to_string())
    }

    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NoImage => "no_image",
            Self::Upstream(_) => "upstream",
        }
    }
}

/// One submission. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    model: Option<String>,
    history: Vec<ConversationTurn>,
}

impl GenerationRequest {
    /// Rejects a missing or empty prompt before anything leaves the process.
    pub fn new(
        prompt: Option<String>,
        model: Option<String>,
        history: Vec<ConversationTurn>,
    ) -> Result<Self, GenerationError> {
        let prompt = prompt
            .filter(|value| !value.is_empty())
            .ok_or_else(GenerationError::prompt_required)?;
        Ok(Self {
            prompt,
            model: model.filter(|value| !value.trim().is_empty()),
            history: history
                .into_iter()
                .map(ConversationTurn::normalized)
                .collect(),
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image: Option<String>,
    pub status: String,
    pub error: Option<GenerationError>,
    pub mode: GenerationMode,
    pub via_fallback: bool,
}

impl GenerationResult {
    pub fn success(image: String, mode: GenerationMode, via_fallback: bool) -> Self {
        Self {
            image: Some(image),
            status: status_for(mode).to_string(),
            error: None,
            mode,
            via_fallback,
        }
    }

    pub fn failure(error: GenerationError, mode: GenerationMode) -> Self {
        Self {
            image: None,
            status: error.to_string(),
            error: Some(error),
            mode,
            via_fallback: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.image.is_some()
    }

    /// Text for the assistant turn that records this result.
    pub fn turn_text(&self) -> String {
        match &self.error {
            Some(error) => format!("Error: {error}"),
            None => self.status.clone(),
        }
    }
}

fn upstream_message(message: &str) -> &str {
    if message.trim().is_empty() {
        UPSTREAM_FALLBACK_MESSAGE
    } else {
        message
    }
}

pub fn status_for(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Generate => GENERATED_STATUS,
        GenerationMode::Edit => MODIFIED_STATUS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_missing_prompt_is_a_validation_error() {
        let missing = GenerationRequest::new(None, None, Vec::new()).unwrap_err();
        let empty = GenerationRequest::new(Some(String::new()), None, Vec::new()).unwrap_err();
        for err in [missing, empty] {
            assert!(err.is_client_fault());
            assert_eq!(err.to_string(), "Prompt is required");
        }
    }

    #[test]
    fn request_normalizes_history_and_blank_model() {
        let history = vec![ConversationTurn {
            role: crate::chat::Role::User,
            content: "hi".to_string(),
            image: Some("data:x".to_string()),
        }];
        let request =
            GenerationRequest::new(Some("a cat".to_string()), Some(" ".to_string()), history)
                .unwrap();
        assert_eq!(request.prompt(), "a cat");
        assert_eq!(request.model(), None);
        assert_eq!(request.history()[0].image, None);
    }

    #[test]
    fn upstream_errors_fall_back_to_generic_message() {
        assert_eq!(
            GenerationError::Upstream(String::new()).to_string(),
            UPSTREAM_FALLBACK_MESSAGE
        );
        assert_eq!(
            GenerationError::Upstream("quota exceeded".to_string()).to_string(),
            "quota exceeded"
        );
        assert_eq!(GenerationError::NoImage.to_string(), NO_IMAGE_MESSAGE);
        assert!(!GenerationError::NoImage.is_client_fault());
    }

    #[test]
    fn status_text_follows_mode() {
        let generated =
            GenerationResult::success("data:a".to_string(), GenerationMode::Generate, false);
        assert_eq!(generated.status, "Image generated successfully!");
        assert!(generated.is_success());

        let modified = GenerationResult::success("data:a".to_string(), GenerationMode::Edit, true);
        assert_eq!(modified.status, "Image modified successfully!");
        assert_eq!(modified.turn_text(), "Image modified successfully!");

        let failed = GenerationResult::failure(GenerationError::NoImage, GenerationMode::Edit);
        assert!(!failed.is_success());
        assert_eq!(
            failed.turn_text(),
            "Error: Failed to generate image. Please try a different prompt."
        );
    }
}
