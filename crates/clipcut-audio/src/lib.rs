//! Audio processing crate for clipcut
//!
//! Provides decoding, 16-bit PCM encoding and the sample-level edit
//! operations behind the transcode engines.
//!
//! # Features
//! - **WAV** decode/encode via hound
//! - **Compressed formats** (mp3, ogg, flac, m4a) decoded via symphonia
//! - **Edit operations**: trim, volume, concat on interleaved PCM
//! - **Scratch space**: named buffers driven by engine commands
//! - **FFmpeg discovery** for the external-process engine

pub mod decoder;
pub mod ffmpeg;
pub mod file_io;
pub mod ops;
pub mod pcm;
pub mod scratch;

pub use ffmpeg::find_ffmpeg;
pub use ops::{apply_volume, concat, trim};
pub use pcm::PcmAudio;
pub use scratch::ScratchSpace;

/// Decode an encoded audio payload (WAV or any symphonia-supported container)
pub fn decode_bytes(bytes: &[u8], mime_type: Option<&str>) -> anyhow::Result<PcmAudio> {
    pcm::decode(bytes, mime_type)
}

/// Encode PCM audio as a 16-bit WAV payload
pub fn encode_wav16(audio: &PcmAudio) -> anyhow::Result<Vec<u8>> {
    pcm::encode_wav16(audio)
}

/// Duration of an encoded payload in seconds, without decoding every packet when possible
pub fn probe_duration(bytes: &[u8], mime_type: Option<&str>) -> anyhow::Result<f64> {
    pcm::probe_duration(bytes, mime_type)
}
