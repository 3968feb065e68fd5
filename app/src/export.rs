//! Export of the current asset
//!
//! Exports are always `audio/wav`. The file is named after the session's
//! display name, with the extension forced to `.wav`.

use std::path::{Path, PathBuf};

use crate::asset::{AudioAsset, WAV_MIME};
use crate::error::{EditorError, Result, StorageError};
use crate::transcode::{EngineError, TranscodeError};

pub const EXPORT_EXTENSION: &str = "wav";

/// File name for an export: display name (or asset name), cleaned, `.wav`
pub fn export_file_name(display_name: &str, asset_name: &str) -> String {
    let base = if display_name.trim().is_empty() {
        asset_name
    } else {
        display_name.trim()
    };

    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());

    let stem = if cleaned.is_empty() { "audio" } else { cleaned };
    format!("{}.{}", stem, EXPORT_EXTENSION)
}

/// WAV payload for an asset, re-encoding anything that is not WAV already
async fn wav_bytes(asset: &AudioAsset) -> Result<Vec<u8>> {
    if asset.mime_type() == WAV_MIME {
        return Ok(asset.bytes().to_vec());
    }

    tracing::debug!("Re-encoding {} ({}) for export", asset.name(), asset.mime_type());
    let bytes = asset.bytes().to_vec();
    let mime = asset.mime_type().to_string();
    tokio::task::spawn_blocking(move || {
        let audio = clipcut_audio::decode_bytes(&bytes, Some(mime.as_str()))?;
        clipcut_audio::encode_wav16(&audio)
    })
    .await
    .map_err(|e| TranscodeError::Engine(EngineError::failed(e)))?
    .map_err(|e| TranscodeError::Engine(EngineError::failed(format!("{:#}", e))).into())
}

/// Write `asset` into `dir`; returns the written path
pub async fn export_asset(asset: &AudioAsset, display_name: &str, dir: &Path) -> Result<PathBuf> {
    if asset.size_bytes() == 0 {
        return Err(EditorError::validation("Nothing to export"));
    }

    let path = dir.join(export_file_name(display_name, asset.name()));
    let bytes = wav_bytes(asset).await?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(StorageError::from)?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(StorageError::from)?;

    tracing::info!("Exported {} bytes to {:?}", bytes.len(), path);
    Ok(path)
}
