//! Generic decoder using symphonia
//!
//! Handles the compressed containers an upload may arrive in
//! (mp3, ogg/vorbis, flac, m4a/aac) by probing an in-memory payload.

use anyhow::{Context, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::pcm::PcmAudio;

struct DecoderState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    n_frames: Option<u64>,
}

/// Map a mime type to a probe hint extension
fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/ogg" | "audio/vorbis" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some("m4a"),
        _ => None,
    }
}

fn open_bytes(bytes: &[u8], mime_type: Option<&str>) -> Result<DecoderState> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = mime_type.and_then(extension_for_mime) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Unknown sample rate")?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let n_frames = track.codec_params.n_frames;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    Ok(DecoderState {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
        n_frames,
    })
}

/// Decode a whole payload into interleaved PCM
pub fn decode_bytes(bytes: &[u8], mime_type: Option<&str>) -> Result<PcmAudio> {
    let mut state = open_bytes(bytes, mime_type)?;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match state.format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != state.track_id {
            continue;
        }

        let decoded = match state.decoder.decode(&packet) {
            Ok(d) => d,
            // A corrupt frame is skipped, the stream continues
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        anyhow::bail!("Audio stream contains no samples");
    }

    Ok(PcmAudio::new(
        samples,
        state.sample_rate,
        state.channels as u16,
    ))
}

/// Duration from container metadata, falling back to a full decode
pub fn probe_duration(bytes: &[u8], mime_type: Option<&str>) -> Result<f64> {
    let state = open_bytes(bytes, mime_type)?;
    if let Some(frames) = state.n_frames {
        return Ok(frames as f64 / state.sample_rate as f64);
    }
    drop(state);
    Ok(decode_bytes(bytes, mime_type)?.duration())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/wav; codecs=1"), Some("wav"));
        assert_eq!(extension_for_mime("video/mp4"), None);
    }

    #[test]
    fn test_symphonia_reads_wav_payload() {
        let audio = PcmAudio::silence(0.5, 8000, 1);
        let bytes = crate::pcm::encode_wav16(&audio).unwrap();
        let decoded = decode_bytes(&bytes, Some("audio/wav")).unwrap();
        assert_eq!(decoded.frames(), 4000);
        let duration = probe_duration(&bytes, Some("audio/wav")).unwrap();
        assert!((duration - 0.5).abs() < 1e-9);
    }
}
