use std::fmt;

use thiserror::Error;

use super::registry::{Capability, ModelRegistry, ModelSpec};

/// Why the selected model is not the one the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NotRequested,
    Unavailable { requested: String },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NotRequested => f.write_str("no model requested"),
            FallbackReason::Unavailable { requested } => {
                write!(f, "model '{requested}' is not available")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no {0} model is registered")]
    NoModel(Capability),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback: Option<FallbackReason>,
}

/// Turns free-form selector values into registered models of one capability.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: ModelRegistry,
    capability: Capability,
    default_model: Option<String>,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry, capability: Capability) -> Self {
        Self {
            registry,
            capability,
            default_model: None,
        }
    }

    /// Model used when a request names nothing usable. Ignored if it does not
    /// resolve for this selector's capability.
    pub fn with_default(mut self, selector: impl Into<String>) -> Self {
        self.default_model = Some(selector.into());
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn default_model(&self) -> Result<&ModelSpec, SelectionError> {
        self.default_model
            .as_deref()
            .and_then(|selector| self.registry.lookup(selector, self.capability))
            .or_else(|| self.registry.first_for(self.capability))
            .ok_or(SelectionError::NoModel(self.capability))
    }

    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, SelectionError> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if let Some(model) = requested
            .as_deref()
            .and_then(|selector| self.registry.lookup(selector, self.capability))
        {
            let model = model.clone();
            return Ok(ModelSelection {
                model,
                requested,
                fallback: None,
            });
        }

        let fallback = match &requested {
            Some(selector) => FallbackReason::Unavailable {
                requested: selector.clone(),
            },
            None => FallbackReason::NotRequested,
        };
        Ok(ModelSelection {
            model: self.default_model()?.clone(),
            requested,
            fallback: Some(fallback),
        })
    }
}
