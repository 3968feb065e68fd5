//! Sample-level edit operations
//!
//! All positions are converted to frame indices with [`PcmAudio::frame_at`],
//! so spans cut at the same time value always meet on the same frame.

use anyhow::Result;

use crate::pcm::PcmAudio;

/// Keep `duration` seconds starting at `offset`, or everything after `offset`.
///
/// Both bounds round to the nearest frame, so a span narrower than half a
/// frame, or one starting within half a frame of the end, comes back empty.
pub fn trim(audio: &PcmAudio, offset: f64, duration: Option<f64>) -> Result<PcmAudio> {
    if !offset.is_finite() || offset < 0.0 {
        anyhow::bail!("Invalid trim offset: {}", offset);
    }
    if let Some(d) = duration {
        if !d.is_finite() || d <= 0.0 {
            anyhow::bail!("Invalid trim duration: {}", d);
        }
    }

    let start = audio.frame_at(offset);
    let end = match duration {
        Some(d) => audio.frame_at(offset + d),
        None => audio.frames(),
    };

    // Offsets that round onto the final frame boundary give an empty span
    let half_frame = 0.5 / audio.sample_rate.max(1) as f64;
    if offset >= audio.duration() + half_frame {
        anyhow::bail!(
            "Trim offset {:.3}s is past the end of the stream ({:.3}s)",
            offset,
            audio.duration()
        );
    }

    let channels = audio.channels as usize;
    let samples = audio.samples[start * channels..end * channels].to_vec();

    tracing::debug!(
        "trim: frames {}..{} of {} ({} Hz, {} ch)",
        start,
        end,
        audio.frames(),
        audio.sample_rate,
        audio.channels
    );

    Ok(PcmAudio::new(samples, audio.sample_rate, audio.channels))
}

/// Multiply every sample by `gain`; clipping happens at encode time
pub fn apply_volume(audio: &PcmAudio, gain: f64) -> PcmAudio {
    let gain = gain as f32;
    PcmAudio::new(
        audio.samples.iter().map(|s| s * gain).collect(),
        audio.sample_rate,
        audio.channels,
    )
}

/// Join buffers end to end without crossfade
pub fn concat(parts: &[PcmAudio]) -> Result<PcmAudio> {
    let first = parts
        .first()
        .ok_or_else(|| anyhow::anyhow!("Nothing to concatenate"))?;

    if let Some(bad) = parts.iter().find(|p| !p.same_format(first)) {
        anyhow::bail!(
            "Cannot concatenate {} Hz/{} ch with {} Hz/{} ch",
            first.sample_rate,
            first.channels,
            bad.sample_rate,
            bad.channels
        );
    }

    let total: usize = parts.iter().map(|p| p.samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    for part in parts {
        samples.extend_from_slice(&part.samples);
    }

    Ok(PcmAudio::new(samples, first.sample_rate, first.channels))
}
