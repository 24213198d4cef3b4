use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use studio_contracts::chat::{classify_request, IntentClassifier, KeywordClassifier};
use studio_contracts::events::{EventPayload, EventWriter};
use studio_contracts::generation::{GenerationError, GenerationRequest, GenerationResult};
use studio_contracts::models::{Capability, FallbackReason, ModelRegistry, ModelSelector};
use tracing::{info, info_span, warn};
use uuid::Uuid;

mod backend;
mod config;
mod content;
mod dryrun;
mod gemini;
mod media;
mod session;

pub use backend::GenerativeBackend;
pub use config::{EngineConfig, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
pub use content::{
    first_inline_image, response_text, Candidate, Content, GenerateContentResponse, InlineData,
    InlineImage, Part,
};
pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;
pub use media::{artifact_file_name, extension_for_mime, save_data_uri, DataUri};
pub use session::ChatSession;

pub const REWRITE_INSTRUCTION: &str = "Generate a detailed image generation prompt for: ";

const ERROR_CHAIN_MAX_CHARS: usize = 512;

/// Terminal state of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Succeeded {
        image: String,
    },
    SucceededViaFallback {
        image: String,
        rewritten_prompt: String,
    },
    Failed {
        error: GenerationError,
    },
}

impl GenerationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::SucceededViaFallback { .. } => "succeeded_via_fallback",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Classifies a submission, picks the model, and runs generate, then
/// rewrite-and-regenerate once if the first call produced no image.
pub struct GenerationEngine {
    backend: Arc<dyn GenerativeBackend>,
    classifier: Box<dyn IntentClassifier>,
    image_selector: ModelSelector,
    image_model: String,
    text_model: String,
    events: Option<EventWriter>,
}

impl GenerationEngine {
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: &EngineConfig) -> Self {
        let mut registry = ModelRegistry::default();
        registry.register_named(&config.image_model, Capability::Image);
        registry.register_named(&config.text_model, Capability::Text);
        let text_model = configured_model(
            &ModelSelector::new(registry.clone(), Capability::Text),
            &config.text_model,
            DEFAULT_TEXT_MODEL,
        );
        let image_selector = ModelSelector::new(registry, Capability::Image);
        let image_model =
            configured_model(&image_selector, &config.image_model, DEFAULT_IMAGE_MODEL);
        let image_selector = image_selector.with_default(&image_model);

        Self {
            backend,
            classifier: Box::new(KeywordClassifier::default()),
            image_selector,
            image_model,
            text_model,
            events: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn event_writer(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    /// Runs one submission end to end. Never panics on upstream trouble;
    /// every failure comes back inside the result.
    pub fn submit(&self, request: &GenerationRequest) -> GenerationResult {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("generation", request_id = %request_id);
        let _entered = span.enter();
        let started = Instant::now();

        let classification =
            classify_request(self.classifier.as_ref(), request.prompt(), request.history());
        let mode = classification.mode;

        let model = match self.resolve_image_model(request.model()) {
            Ok(model) => model,
            Err(error) => return self.finish(&request_id, GenerationResult::failure(error, mode)),
        };

        info!(
            mode = mode.as_str(),
            model = %model,
            history = request.history().len(),
            anchored = classification.anchored,
            "generation requested"
        );
        self.emit(
            &request_id,
            "generation_requested",
            json_object(json!({
                "mode": mode.as_str(),
                "selector": request.model(),
                "model": model,
                "history_turns": request.history().len(),
                "prompt_rewritten": classification.anchored,
            })),
        );

        let outcome = self.orchestrate(&request_id, &classification.effective_prompt, &model);
        let result = match outcome {
            GenerationOutcome::Succeeded { image } => GenerationResult::success(image, mode, false),
            GenerationOutcome::SucceededViaFallback { image, .. } => {
                GenerationResult::success(image, mode, true)
            }
            GenerationOutcome::Failed { error } => GenerationResult::failure(error, mode),
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            via_fallback = result.via_fallback,
            "generation finished"
        );
        self.finish(&request_id, result)
    }

    /// The fallback sequence on an already-classified prompt. Calls are made
    /// strictly in order and stop at the first image.
    pub fn orchestrate(&self, request_id: &str, prompt: &str, model: &str) -> GenerationOutcome {
        match self.attempt_image(request_id, 1, model, prompt) {
            Ok(Some(image)) => return GenerationOutcome::Succeeded { image },
            Ok(None) => {}
            Err(error) => return GenerationOutcome::Failed { error },
        }

        warn!("no image in first response; rewriting prompt");
        let instruction = format!("{REWRITE_INSTRUCTION}{prompt}");
        let rewritten = match self.backend.generate_text(&self.text_model, &instruction) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                return GenerationOutcome::Failed {
                    error: upstream_error(&err),
                }
            }
        };
        // An empty rewrite still gets its one retry, with the prompt we had.
        let retry_prompt = if rewritten.is_empty() {
            warn!("text model returned no prompt; retrying with the same prompt");
            prompt.to_string()
        } else {
            rewritten
        };
        self.emit(
            request_id,
            "prompt_rewritten",
            json_object(json!({
                "text_model": self.text_model,
                "prompt_chars": retry_prompt.chars().count(),
            })),
        );

        match self.attempt_image(request_id, 2, model, &retry_prompt) {
            Ok(Some(image)) => GenerationOutcome::SucceededViaFallback {
                image,
                rewritten_prompt: retry_prompt,
            },
            Ok(None) => GenerationOutcome::Failed {
                error: GenerationError::NoImage,
            },
            Err(error) => GenerationOutcome::Failed { error },
        }
    }

    fn attempt_image(
        &self,
        request_id: &str,
        attempt: u8,
        model: &str,
        prompt: &str,
    ) -> Result<Option<String>, GenerationError> {
        let response = self
            .backend
            .generate_image(model, prompt)
            .map_err(|err| upstream_error(&err))?;
        let image = first_inline_image(&response).map(|image| image.data_uri());
        self.emit(
            request_id,
            "image_attempt",
            json_object(json!({
                "attempt": attempt,
                "model": model,
                "candidates": response.candidates.len(),
                "found_image": image.is_some(),
            })),
        );
        Ok(image)
    }

    fn resolve_image_model(&self, requested: Option<&str>) -> Result<String, GenerationError> {
        let selection = self
            .image_selector
            .select(requested)
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;
        if let Some(reason @ FallbackReason::Unavailable { .. }) = selection.fallback.as_ref() {
            warn!(%reason, model = %selection.model.name, "image model fallback");
        }
        Ok(selection.model.name)
    }

    fn finish(&self, request_id: &str, result: GenerationResult) -> GenerationResult {
        if let Some(error) = result.error.as_ref() {
            warn!(kind = error.kind(), %error, "generation failed");
        }
        self.emit(
            request_id,
            "generation_finished",
            json_object(json!({
                "mode": result.mode.as_str(),
                "success": result.is_success(),
                "via_fallback": result.via_fallback,
                "error_kind": result.error.as_ref().map(GenerationError::kind),
                "error": result.error.as_ref().map(ToString::to_string),
            })),
        );
        result
    }

    fn emit(&self, request_id: &str, event_type: &str, payload: EventPayload) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.for_request(request_id).emit(event_type, payload) {
            warn!(event_type, error = %format!("{err:#}"), "failed to record event");
        }
    }
}

/// Resolves a model named in configuration for the selector's capability.
/// A name that is unknown or registered with the other capability is replaced
/// by the selector's default, and the replacement is logged.
fn configured_model(selector: &ModelSelector, configured: &str, fallback: &str) -> String {
    match selector.select(Some(configured)) {
        Ok(selection) => {
            if let Some(reason) = &selection.fallback {
                warn!(
                    capability = %selector.capability(),
                    configured,
                    using = %selection.model.name,
                    %reason,
                    "configured model ignored"
                );
            }
            selection.model.name
        }
        Err(err) => {
            warn!(configured, using = fallback, %err, "configured model ignored");
            fallback.to_string()
        }
    }
}

fn upstream_error(err: &anyhow::Error) -> GenerationError {
    GenerationError::Upstream(error_chain_text(err, ERROR_CHAIN_MAX_CHARS))
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return gemini::truncate_text(err.to_string().trim(), max_chars);
    }
    gemini::truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
