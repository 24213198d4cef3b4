use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-001";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-pro";

/// Runtime settings for the engine and its Gemini backend.
///
/// Credentials only ever come from the environment.
#[derive(Clone)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout: Duration,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("request_timeout", &self.request_timeout)
            .field("transport_retries", &self.transport_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout: Duration::from_secs(90),
            transport_retries: 0,
            retry_backoff: Duration::from_secs_f64(1.2),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let number = |key: &str| parse_f64(non_empty(key), key);

        let request_timeout_s = number("STUDIO_REQUEST_TIMEOUT")?
            .map(|value| value.clamp(15.0, 300.0))
            .unwrap_or(defaults.request_timeout.as_secs_f64());
        let transport_retries = number("STUDIO_TRANSPORT_RETRIES")?
            .map(|value| value.clamp(0.0, 4.0).round() as usize)
            .unwrap_or(defaults.transport_retries);
        let retry_backoff_s = number("STUDIO_RETRY_BACKOFF")?
            .map(|value| value.clamp(0.1, 10.0))
            .unwrap_or(defaults.retry_backoff.as_secs_f64());

        Ok(Self {
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            image_model: non_empty("STUDIO_IMAGE_MODEL").unwrap_or(defaults.image_model),
            text_model: non_empty("STUDIO_TEXT_MODEL").unwrap_or(defaults.text_model),
            request_timeout: Duration::from_secs_f64(request_timeout_s),
            transport_retries,
            retry_backoff: Duration::from_secs_f64(retry_backoff_s),
        })
    }
}

fn parse_f64(raw: Option<String>, key: &str) -> Result<Option<f64>> {
    raw.map(|value| {
        value
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite())
            .with_context(|| format!("{key} must be a number, got '{value}'"))
    })
    .transpose()
}
