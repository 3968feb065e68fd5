//! Immutable audio payloads

use clipcut_types::AssetInfo;
use std::sync::Arc;

/// Mime type of every transcode output and of exported files
pub const WAV_MIME: &str = "audio/wav";

/// An immutable audio payload with its metadata.
///
/// Cloning is cheap: the bytes are shared. Equality compares metadata and
/// bytes by value.
#[derive(Clone, PartialEq)]
pub struct AudioAsset {
    name: String,
    mime_type: String,
    data: Arc<[u8]>,
    duration: Option<f64>,
}

impl AudioAsset {
    /// Wrap a payload, probing its duration from the header
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let mime_type = mime_type.into();
        let data: Arc<[u8]> = data.into();

        let duration = match clipcut_audio::probe_duration(&data, Some(mime_type.as_str())) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::debug!("Could not probe duration of {}: {}", name, e);
                None
            }
        };

        Self {
            name,
            mime_type,
            data,
            duration,
        }
    }

    /// Like [`AudioAsset::new`], probing on the blocking pool.
    ///
    /// Containers without a frame count are decoded in full to find their
    /// duration, so async callers holding foreign payloads use this.
    pub async fn probed(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        let name = name.into();
        let mime_type = mime_type.into();
        let data: Arc<[u8]> = data.into();

        let fallback = Self {
            name: name.clone(),
            mime_type: mime_type.clone(),
            data: data.clone(),
            duration: None,
        };
        match tokio::task::spawn_blocking(move || Self::new(name, mime_type, data)).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::warn!("Duration probe of {} panicked: {}", fallback.name, e);
                fallback
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Duration in seconds, `None` when the payload could not be probed
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Upload filter: only `audio/*` payloads are editable
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes(),
            duration: self.duration,
        }
    }
}

impl std::fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAsset")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.data.len())
            .field("duration", &self.duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcut_audio::PcmAudio;

    #[test]
    fn test_asset_probes_wav_duration() {
        let bytes = clipcut_audio::encode_wav16(&PcmAudio::silence(1.5, 8000, 1)).unwrap();
        let asset = AudioAsset::new("tone.wav", WAV_MIME, bytes);
        assert!((asset.duration().unwrap() - 1.5).abs() < 1e-9);
        assert!(asset.is_audio());
        assert_eq!(asset.info().name, "tone.wav");
    }

    #[tokio::test]
    async fn test_probed_matches_new() {
        let bytes = clipcut_audio::encode_wav16(&PcmAudio::silence(0.75, 8000, 2)).unwrap();
        let probed = AudioAsset::probed("tone.wav", WAV_MIME, bytes.clone()).await;
        assert_eq!(probed, AudioAsset::new("tone.wav", WAV_MIME, bytes));
        assert!((probed.duration().unwrap() - 0.75).abs() < 1e-9);

        let junk = AudioAsset::probed("junk.mp3", "audio/mpeg", vec![0u8; 32]).await;
        assert_eq!(junk.duration(), None);
    }

    #[test]
    fn test_asset_equality_is_by_value() {
        let a = AudioAsset::new("a.wav", WAV_MIME, vec![1u8, 2, 3]);
        let b = AudioAsset::new("a.wav", WAV_MIME, vec![1u8, 2, 3]);
        let c = AudioAsset::new("a.wav", WAV_MIME, vec![1u8, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.duration(), None);
    }
}
