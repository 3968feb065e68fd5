//! Transcode gateway and its engines
//!
//! The gateway turns editor intents (crop, gain) into engine command cycles.
//! Engines only know about named files and `EngineCommand`s.

mod engine;
mod ffmpeg;
mod gateway;
mod native;

pub use engine::{validate_file_name, EngineError, TranscodeEngine};
pub use ffmpeg::FfmpegEngine;
pub use gateway::{EngineFactory, TranscodeGateway, ADJUSTED_NAME, CROPPED_NAME};
pub use native::NativeEngine;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    #[error("Invalid range {start:.3}s..{end:.3}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("Invalid gain {0}")]
    InvalidGain(f64),

    #[error("Asset duration is unknown; cannot split around a region")]
    UnknownDuration,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
