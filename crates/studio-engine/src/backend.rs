use anyhow::Result;

use crate::content::GenerateContentResponse;

/// The two capabilities the orchestrator consumes from a generative service.
///
/// Both calls are blocking; the server drives them from the blocking pool.
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Image generation. Returns zero or more candidates, each possibly
    /// carrying inline image parts.
    fn generate_image(&self, model: &str, prompt: &str) -> Result<GenerateContentResponse>;

    /// Text generation. An empty string is a valid (useless) answer.
    fn generate_text(&self, model: &str, prompt: &str) -> Result<String>;
}
