//! In-memory PCM audio and the WAV codec
//!
//! Samples are interleaved f32 normalized to `[-1, 1)`. Conversion to and
//! from 16-bit uses a symmetric `32768` scale, so a 16-bit sample that is
//! decoded and re-encoded without processing comes back bit-identical.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// Scale between f32 samples and signed 16-bit PCM
const I16_SCALE: f32 = 32768.0;

/// Decoded, interleaved PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    /// Interleaved samples: [L0, R0, L1, R1, ...]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Silence of the given length
    pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (seconds * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index for a time position, rounded to the nearest frame and clamped
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        frame.min(self.frames())
    }

    /// Check that two buffers can be joined end to end
    pub fn same_format(&self, other: &PcmAudio) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a payload, WAV through hound and everything else through symphonia
pub fn decode(bytes: &[u8], mime_type: Option<&str>) -> Result<PcmAudio> {
    if is_riff_wave(bytes) {
        match decode_wav(bytes) {
            Ok(audio) => return Ok(audio),
            // hound rejects some WAV flavours (e.g. WAVE_FORMAT_EXTENSIBLE quirks)
            Err(e) => tracing::debug!("hound could not read WAV, trying symphonia: {}", e),
        }
    }
    crate::decoder::decode_bytes(bytes, mime_type)
}

/// Decode a WAV payload with hound
fn decode_wav(bytes: &[u8]) -> Result<PcmAudio> {
    let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV header")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float WAV samples")?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read integer WAV samples")?
        }
    };

    Ok(PcmAudio::new(samples, spec.sample_rate, spec.channels))
}

/// Encode as 16-bit little-endian PCM WAV
pub fn encode_wav16(audio: &PcmAudio) -> Result<Vec<u8>> {
    if audio.channels == 0 || audio.sample_rate == 0 {
        anyhow::bail!(
            "Invalid PCM format: {} channels at {} Hz",
            audio.channels,
            audio.sample_rate
        );
    }

    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in &audio.samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).round().clamp(-32768.0, 32767.0) as i16
}

/// Duration in seconds, read from the header when the container carries it
pub fn probe_duration(bytes: &[u8], mime_type: Option<&str>) -> Result<f64> {
    if is_riff_wave(bytes) {
        if let Ok(reader) = WavReader::new(Cursor::new(bytes)) {
            let spec = reader.spec();
            return Ok(reader.duration() as f64 / spec.sample_rate as f64);
        }
    }
    crate::decoder::probe_duration(bytes, mime_type)
}
