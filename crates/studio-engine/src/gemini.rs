use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::GenerativeBackend;
use crate::config::EngineConfig;
use crate::content::{response_text, GenerateContentResponse};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language `generateContent` over blocking HTTP.
pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
    request_timeout: Duration,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiBackend {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let http = HttpClient::builder()
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            http,
            request_timeout: config.request_timeout,
            transport_retries: config.transport_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn prompt_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        })
    }

    fn post_with_transport_retries(&self, endpoint: &str, payload: &Value) -> Result<HttpResponse> {
        for attempt in 0..=self.transport_retries {
            let response = self
                .http
                .post(endpoint)
                .header(API_KEY_HEADER, &self.api_key)
                .timeout(self.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= self.transport_retries {
                        return Err(err);
                    }
                    warn!(
                        attempt = attempt + 1,
                        max = self.transport_retries,
                        "Gemini transport retry after transient request failure"
                    );
                    thread::sleep(self.retry_backoff.mul_f64(attempt as f64 + 1.0));
                }
            }
        }

        unreachable!("Gemini transport retry loop should always return a response or error")
    }

    fn generate_content(&self, model: &str, prompt: &str) -> Result<GenerateContentResponse> {
        let endpoint = self.endpoint_for_model(model);
        debug!(%endpoint, prompt_chars = prompt.chars().count(), "calling generateContent");
        let response =
            self.post_with_transport_retries(&endpoint, &Self::prompt_payload(prompt))?;
        let parsed: GenerateContentResponse = response_json_or_error("Gemini", response)?;
        debug!(
            candidates = parsed.candidates.len(),
            blocked = parsed.prompt_feedback.is_some(),
            "generateContent answered"
        );
        Ok(parsed)
    }
}

impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, model: &str, prompt: &str) -> Result<GenerateContentResponse> {
        self.generate_content(model, prompt)
    }

    fn generate_text(&self, model: &str, prompt: &str) -> Result<String> {
        let response = self.generate_content(model, prompt)?;
        Ok(response_text(&response))
    }
}

fn response_json_or_error<T: DeserializeOwned>(provider: &str, response: HttpResponse) -> Result<T> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            api_error_message(&body).unwrap_or_else(|| truncate_text(&body, 512))
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

/// `error.message` from a Google API error body.
fn api_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
