use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// A `data:{mime};base64,{payload}` URI split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    pub fn parse(uri: &'a str) -> Result<Self> {
        let Some(rest) = uri.trim().strip_prefix("data:") else {
            bail!("not a data URI");
        };
        let Some((header, data)) = rest.split_once(',') else {
            bail!("data URI has no payload");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("data URI is not base64 encoded");
        };
        Ok(Self { mime_type, data })
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .context("data URI base64 decode failed")
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(self.mime_type)
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

/// `turn-{nn}-{shortid}.{ext}`; the short id is a hash prefix of the payload.
pub fn artifact_file_name(index: usize, uri: &DataUri<'_>) -> String {
    let digest = Sha256::digest(uri.data.as_bytes());
    format!(
        "turn-{:02}-{}.{}",
        index,
        hex::encode(&digest[..4]),
        uri.extension()
    )
}

/// Decodes `uri` and writes it under `dir`, returning the written path.
pub fn save_data_uri(dir: &Path, index: usize, uri: &str) -> Result<PathBuf> {
    let parsed = DataUri::parse(uri)?;
    let bytes = parsed.decode()?;
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(artifact_file_name(index, &parsed));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
