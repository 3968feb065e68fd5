//! Audio file I/O

use anyhow::{Context, Result};
use std::path::Path;

/// Mime type for a file extension, `None` for formats we cannot decode
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "ogg" | "oga" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "m4a" | "aac" => Some("audio/mp4"),
        _ => None,
    }
}

/// Read an audio file, returning its bytes and mime type
pub fn read_audio_file(path: impl AsRef<Path>) -> Result<(Vec<u8>, String)> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let mime = match mime_for_extension(ext) {
        Some(mime) => mime,
        None => anyhow::bail!("Unsupported audio format: {}", ext),
    };

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read audio file: {:?}", path))?;

    Ok((bytes, mime.to_string()))
}
