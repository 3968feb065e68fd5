//! FFmpeg discovery
//!
//! The FFmpeg engine shells out to a binary found next to the executable,
//! in the working directory, or on PATH.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Environment variable that pins a specific FFmpeg binary
pub const FFMPEG_ENV: &str = "CLIPCUT_FFMPEG";

/// Find FFmpeg binary
///
/// Search order:
/// 1. `CLIPCUT_FFMPEG` environment variable
/// 2. Next to executable
/// 3. Current working directory
/// 4. System PATH
pub fn find_ffmpeg() -> Result<PathBuf> {
    if let Some(pinned) = std::env::var_os(FFMPEG_ENV) {
        let path = PathBuf::from(pinned);
        if path.exists() {
            tracing::info!("Using FFmpeg from {}: {:?}", FFMPEG_ENV, path);
            return Ok(path);
        }
        tracing::warn!("{} points to a missing file: {:?}", FFMPEG_ENV, path);
    }

    let mut search_paths = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        let exe_dir = exe_path.parent().unwrap_or(Path::new("."));
        search_paths.push(exe_dir.join("ffmpeg"));
        search_paths.push(exe_dir.join("resources/ffmpeg"));
    }

    if let Ok(cwd) = std::env::current_dir() {
        search_paths.push(cwd.join("ffmpeg"));
        search_paths.push(cwd.join("vendor/ffmpeg/ffmpeg"));
    }

    tracing::debug!("FFmpeg search paths: {:?}", search_paths);

    for path in &search_paths {
        if path.is_file() {
            tracing::info!("Found FFmpeg: {:?}", path);
            return Ok(path.clone());
        }
    }

    if let Ok(path) = which::which("ffmpeg") {
        tracing::info!("Using system FFmpeg: {:?}", path);
        return Ok(path);
    }

    anyhow::bail!("FFmpeg not found in {:?} or PATH", search_paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only test in this crate touching the process environment
    #[test]
    fn test_pinned_ffmpeg_wins() {
        let dir = tempfile::tempdir().unwrap();
        let pinned = dir.path().join("ffmpeg-pinned");
        std::fs::write(&pinned, b"").unwrap();

        std::env::set_var(FFMPEG_ENV, &pinned);
        let found = find_ffmpeg();
        std::env::set_var(FFMPEG_ENV, dir.path().join("missing"));
        let fallback = find_ffmpeg();
        std::env::remove_var(FFMPEG_ENV);

        assert_eq!(found.unwrap(), pinned);
        // A stale pin falls through to the normal search
        if let Ok(path) = fallback {
            assert_ne!(path, dir.path().join("missing"));
        }
    }
}
