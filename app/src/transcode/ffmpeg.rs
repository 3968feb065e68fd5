//! FFmpeg CLI engine
//!
//! Named files live in a private scratch directory that is removed when the
//! engine is dropped. Every command re-encodes to `pcm_s16le`.

use async_trait::async_trait;
use clipcut_types::EngineCommand;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::process::Command;

use super::engine::{validate_file_name, EngineError, TranscodeEngine};

pub struct FfmpegEngine {
    binary: PathBuf,
    scratch: TempDir,
}

impl FfmpegEngine {
    /// Locate FFmpeg and create the scratch directory
    pub fn new() -> Result<Self, EngineError> {
        let binary =
            clipcut_audio::find_ffmpeg().map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let scratch = tempfile::Builder::new()
            .prefix("clipcut-ffmpeg-")
            .tempdir()
            .map_err(|e| EngineError::Unavailable(format!("Failed to create scratch dir: {}", e)))?;
        let binary = binary.into();

        tracing::info!(
            "FFmpeg transcode engine ready: binary={:?}, scratch={:?}",
            binary,
            scratch.path()
        );

        Ok(Self { binary, scratch })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        validate_file_name(name)?;
        Ok(self.scratch.path().join(name))
    }

    /// Build FFmpeg arguments for a command
    pub fn args_for(&self, command: &EngineCommand) -> Result<Vec<String>, EngineError> {
        let path_arg = |name: &str| -> Result<String, EngineError> {
            Ok(self.path_for(name)?.to_string_lossy().into_owned())
        };

        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-nostdin".into()];

        match command {
            EngineCommand::Trim {
                input,
                output,
                offset,
                duration,
            } => {
                args.extend(["-i".into(), path_arg(input)?]);
                args.extend(["-ss".into(), offset.to_string()]);
                if let Some(d) = duration {
                    args.extend(["-t".into(), d.to_string()]);
                }
                args.extend(["-acodec".into(), "pcm_s16le".into(), path_arg(output)?]);
            }
            EngineCommand::Volume {
                input,
                output,
                gain,
            } => {
                args.extend(["-i".into(), path_arg(input)?]);
                args.extend(["-af".into(), format!("volume={}", gain)]);
                args.extend(["-acodec".into(), "pcm_s16le".into(), path_arg(output)?]);
            }
            EngineCommand::Concat { inputs, output } => {
                if inputs.is_empty() {
                    return Err(EngineError::Failed("Nothing to concatenate".into()));
                }
                for input in inputs {
                    args.extend(["-i".into(), path_arg(input)?]);
                }
                let streams: String = (0..inputs.len()).map(|i| format!("[{}:a]", i)).collect();
                args.extend([
                    "-filter_complex".into(),
                    format!("{}concat=n={}:v=0:a=1[out]", streams, inputs.len()),
                    "-map".into(),
                    "[out]".into(),
                ]);
                args.extend(["-acodec".into(), "pcm_s16le".into(), path_arg(output)?]);
            }
        }

        Ok(args)
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| EngineError::Failed(format!("Failed to write {}: {}", name, e)))
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(EngineError::Failed(format!("Failed to read {}: {}", name, e))),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Failed(format!("Failed to delete {}: {}", name, e))),
        }
    }

    async fn exec(&self, command: &EngineCommand) -> Result<(), EngineError> {
        let args = self.args_for(command)?;
        tracing::debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable(format!("Failed to start FFmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            let message = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
            // Do not leave a partial output behind
            let _ = self.delete_file(command.output()).await;
            return Err(EngineError::Failed(format!(
                "FFmpeg exited with {}: {}",
                output.status, message
            )));
        }

        Ok(())
    }
}
