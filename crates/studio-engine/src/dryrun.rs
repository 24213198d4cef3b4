use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::backend::GenerativeBackend;
use crate::content::{GenerateContentResponse, Part};

const DRYRUN_SIZE: u32 = 256;

/// Offline stand-in for the Gemini backend.
///
/// Images are solid squares whose colour is derived from the prompt, so the
/// same prompt always renders the same picture.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunBackend;

impl GenerativeBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_image(&self, _model: &str, prompt: &str) -> Result<GenerateContentResponse> {
        let png = render_dryrun_png(prompt, DRYRUN_SIZE, DRYRUN_SIZE)?;
        Ok(GenerateContentResponse::with_parts(vec![
            Part::text(format!("dryrun render for: {prompt}")),
            Part::inline("image/png", BASE64.encode(png)),
        ]))
    }

    fn generate_text(&self, _model: &str, prompt: &str) -> Result<String> {
        let subject = prompt
            .rsplit_once(": ")
            .map(|(_, tail)| tail)
            .unwrap_or(prompt)
            .trim();
        Ok(format!(
            "A highly detailed, well-lit illustration of {subject}, rich colour, sharp focus."
        ))
    }
}

fn render_dryrun_png(prompt: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt);
    let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode dryrun image")?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}
