//! Transcode gateway
//!
//! Owns one lazily created engine. Each operation is a full cycle against the
//! engine's file space: write input, run commands, read output, delete every
//! name it used. Intermediate names are unique per cycle.

use clipcut_types::{EngineCommand, GainLevel, TimeRange, TIME_EPSILON};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::engine::{EngineError, TranscodeEngine};
use super::ffmpeg::FfmpegEngine;
use super::native::NativeEngine;
use super::TranscodeError;
use crate::asset::{AudioAsset, WAV_MIME};
use crate::config::{EngineBackend, Settings};
use crate::workers::WorkerEngine;

/// Output name of a crop
pub const CROPPED_NAME: &str = "cropped_audio.wav";
/// Output name of a gain adjustment
pub const ADJUSTED_NAME: &str = "adjusted_audio.wav";

/// Builds the engine on first use
pub type EngineFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn TranscodeEngine>, EngineError>> + Send + Sync>;

pub struct TranscodeGateway {
    engine: OnceCell<Arc<dyn TranscodeEngine>>,
    factory: EngineFactory,
}

impl TranscodeGateway {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            engine: OnceCell::new(),
            factory,
        }
    }

    /// Gateway over an already constructed engine
    pub fn with_engine(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            engine: OnceCell::new_with(Some(engine)),
            factory: Box::new(|| {
                Box::pin(async { Err(EngineError::Unavailable("engine already set".into())) })
            }),
        }
    }

    /// Gateway whose backend follows the settings
    pub fn from_settings(settings: &Settings) -> Self {
        let backend = settings.engine;
        let worker_path = settings.worker_path.clone();
        let restart_after = settings.worker_restart_after;

        Self::new(Box::new(move || {
            let worker_path = worker_path.clone();
            Box::pin(async move {
                let engine: Arc<dyn TranscodeEngine> = match backend {
                    EngineBackend::Native => Arc::new(NativeEngine::new()),
                    EngineBackend::Ffmpeg => Arc::new(FfmpegEngine::new()?),
                    EngineBackend::Worker => {
                        let path = worker_path;
                        let engine = tokio::task::spawn_blocking(move || {
                            WorkerEngine::start(path, restart_after)
                        })
                        .await
                        .map_err(|e| EngineError::Unavailable(e.to_string()))??;
                        Arc::new(engine)
                    }
                };
                Ok(engine)
            })
        }))
    }

    /// Engine, created on first call
    async fn engine(&self) -> Result<&Arc<dyn TranscodeEngine>, TranscodeError> {
        let engine = self
            .engine
            .get_or_try_init(|| (self.factory)())
            .await
            .map_err(|e| {
                tracing::error!("Transcode engine failed to start: {}", e);
                e
            })?;
        Ok(engine)
    }

    /// Whether the engine has been created yet
    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }

    /// Keep only `[start, end)` of the asset
    pub async fn crop(
        &self,
        asset: &AudioAsset,
        start: f64,
        end: f64,
    ) -> Result<AudioAsset, TranscodeError> {
        let range = TimeRange::new(start, end);
        if !range.is_well_formed() || range.is_cleared() {
            return Err(TranscodeError::InvalidRange { start, end });
        }

        let cycle = Cycle::new();
        let input = cycle.name("input");
        let commands = vec![EngineCommand::Trim {
            input: input.clone(),
            output: cycle.name("cropped"),
            offset: start,
            duration: Some(end - start),
        }];

        tracing::info!(
            "Cropping {} to {:.3}s..{:.3}s",
            asset.name(),
            start,
            end
        );

        let bytes = self.run(asset, input, commands).await?;
        let cropped = AudioAsset::new(CROPPED_NAME, WAV_MIME, bytes);
        // Both bounds rounded onto the same frame
        if cropped.duration().is_some_and(|d| d <= 0.0) {
            tracing::warn!("Crop {:.6}s..{:.6}s selects no audio", start, end);
            return Err(TranscodeError::InvalidRange { start, end });
        }
        Ok(cropped)
    }

    /// Scale the whole asset, or only `region` when given
    pub async fn apply_gain(
        &self,
        asset: &AudioAsset,
        gain: GainLevel,
        region: Option<TimeRange>,
    ) -> Result<AudioAsset, TranscodeError> {
        let gain = gain.value();
        if !(GainLevel::MIN..=GainLevel::MAX).contains(&gain) {
            return Err(TranscodeError::InvalidGain(gain));
        }

        let cycle = Cycle::new();
        let input = cycle.name("input");

        let commands = match region.filter(|r| !r.is_cleared()) {
            None => {
                tracing::info!("Applying gain {} to all of {}", gain, asset.name());
                vec![EngineCommand::Volume {
                    input: input.clone(),
                    output: cycle.name("adjusted"),
                    gain,
                }]
            }
            Some(range) => {
                if !range.is_well_formed() {
                    return Err(TranscodeError::InvalidRange {
                        start: range.start,
                        end: range.end,
                    });
                }
                let duration = asset.duration().ok_or(TranscodeError::UnknownDuration)?;
                if !range.fits_within(duration) {
                    return Err(TranscodeError::InvalidRange {
                        start: range.start,
                        end: range.end,
                    });
                }

                tracing::info!(
                    "Applying gain {} to {:.3}s..{:.3}s of {}",
                    gain,
                    range.start,
                    range.end,
                    asset.name()
                );
                region_commands(&cycle, &input, range, duration, gain)
            }
        };

        let bytes = self.run(asset, input, commands).await?;
        Ok(AudioAsset::new(ADJUSTED_NAME, WAV_MIME, bytes))
    }

    /// Run one cycle; the last command's output is the result
    async fn run(
        &self,
        asset: &AudioAsset,
        input: String,
        commands: Vec<EngineCommand>,
    ) -> Result<Vec<u8>, TranscodeError> {
        let engine = self.engine().await?;
        engine.recycle().await?;

        let mut names = vec![input.clone()];
        names.extend(commands.iter().map(|c| c.output().to_string()));

        let result = async {
            engine.write_file(&input, asset.bytes().to_vec()).await?;
            for command in &commands {
                engine.exec(command).await?;
            }
            let output = commands
                .last()
                .map(|c| c.output())
                .ok_or_else(|| EngineError::failed("empty command list"))?;
            engine.read_file(output).await
        }
        .await;

        for name in &names {
            if let Err(e) = engine.delete_file(name).await {
                tracing::warn!("Failed to delete {} from {} engine: {}", name, engine.name(), e);
            }
        }

        match result {
            Ok(bytes) => {
                tracing::debug!(
                    "{} engine produced {} bytes from {} commands",
                    engine.name(),
                    bytes.len(),
                    commands.len()
                );
                Ok(bytes)
            }
            Err(e) => {
                tracing::warn!("{} engine cycle failed: {}", engine.name(), e);
                Err(e.into())
            }
        }
    }
}

/// Split at the region bounds, scale the middle, join in order.
///
/// Spans that would be empty are elided so the concat never sees a
/// zero-length input.
fn region_commands(
    cycle: &Cycle,
    input: &str,
    range: TimeRange,
    duration: f64,
    gain: f64,
) -> Vec<EngineCommand> {
    let mut commands = Vec::new();
    let mut parts = Vec::new();

    if range.start > TIME_EPSILON {
        let head = cycle.name("head");
        commands.push(EngineCommand::Trim {
            input: input.to_string(),
            output: head.clone(),
            offset: 0.0,
            duration: Some(range.start),
        });
        parts.push(head);
    }

    let middle = cycle.name("middle");
    let scaled = cycle.name("scaled");
    commands.push(EngineCommand::Trim {
        input: input.to_string(),
        output: middle.clone(),
        offset: range.start,
        duration: Some(range.end - range.start),
    });
    commands.push(EngineCommand::Volume {
        input: middle,
        output: scaled.clone(),
        gain,
    });
    parts.push(scaled);

    if range.end < duration - TIME_EPSILON {
        let tail = cycle.name("tail");
        commands.push(EngineCommand::Trim {
            input: input.to_string(),
            output: tail.clone(),
            offset: range.end,
            duration: None,
        });
        parts.push(tail);
    }

    commands.push(EngineCommand::Concat {
        inputs: parts,
        output: cycle.name("adjusted"),
    });
    commands
}

/// Unique name prefix for one engine cycle
struct Cycle {
    id: String,
}

impl Cycle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    fn name(&self, part: &str) -> String {
        format!("{}_{}.wav", part, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcut_audio::PcmAudio;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ramp_asset(seconds: f64, rate: u32) -> AudioAsset {
        let frames = (seconds * rate as f64) as usize;
        let samples = (0..frames)
            .map(|i| ((i % 200) as f32 / 200.0) - 0.5)
            .collect();
        let bytes = clipcut_audio::encode_wav16(&PcmAudio::new(samples, rate, 1)).unwrap();
        AudioAsset::new("ramp.mp3", "audio/mpeg", bytes)
    }

    fn decode(asset: &AudioAsset) -> PcmAudio {
        clipcut_audio::decode_bytes(asset.bytes(), None).unwrap()
    }

    #[tokio::test]
    async fn test_crop_duration_and_name() {
        let engine = Arc::new(NativeEngine::new());
        let gateway = TranscodeGateway::with_engine(engine.clone());
        let asset = ramp_asset(10.0, 8000);

        let cropped = gateway.crop(&asset, 2.0, 5.0).await.unwrap();
        assert_eq!(cropped.name(), CROPPED_NAME);
        assert_eq!(cropped.mime_type(), WAV_MIME);
        assert!((cropped.duration().unwrap() - 3.0).abs() < 1e-3);
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_crop_rejects_inverted_range() {
        let engine = Arc::new(NativeEngine::new());
        let gateway = TranscodeGateway::with_engine(engine.clone());
        let asset = ramp_asset(1.0, 8000);

        let err = gateway.crop(&asset, 0.8, 0.2).await.unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidRange { .. }));
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_crop_narrower_than_a_frame_is_rejected() {
        let engine = Arc::new(NativeEngine::new());
        let gateway = TranscodeGateway::with_engine(engine.clone());
        let asset = ramp_asset(1.0, 8000);

        // 0.5s and 0.50004s both land on frame 4000
        let err = gateway.crop(&asset, 0.5, 0.50004).await.unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidRange { .. }));
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_region_gain_ending_on_last_frame() {
        let engine = Arc::new(NativeEngine::new());
        let gateway = TranscodeGateway::with_engine(engine.clone());
        let asset = ramp_asset(1.0, 8000);
        let original = decode(&asset);

        // The end is inside the clip but rounds to frame 8000
        let out = gateway
            .apply_gain(
                &asset,
                GainLevel::new(2.0).unwrap(),
                Some(TimeRange::new(0.2, 0.99995)),
            )
            .await
            .unwrap();
        let adjusted = decode(&out);

        assert_eq!(adjusted.frames(), original.frames());
        let a = original.frame_at(0.2);
        assert_eq!(adjusted.samples[..a], original.samples[..a]);
        assert_ne!(adjusted.samples[a..], original.samples[a..]);
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_region_gain_starting_within_half_a_frame() {
        let gateway = TranscodeGateway::with_engine(Arc::new(NativeEngine::new()));
        let asset = ramp_asset(1.0, 8000);

        let out = gateway
            .apply_gain(
                &asset,
                GainLevel::new(0.5).unwrap(),
                Some(TimeRange::new(0.00004, 0.5)),
            )
            .await
            .unwrap();
        assert_eq!(decode(&out).frames(), decode(&asset).frames());
    }

    #[tokio::test]
    async fn test_unity_gain_preserves_samples() {
        let gateway = TranscodeGateway::with_engine(Arc::new(NativeEngine::new()));
        let asset = ramp_asset(1.0, 8000);

        let out = gateway
            .apply_gain(&asset, GainLevel::UNITY, None)
            .await
            .unwrap();
        assert_eq!(out.name(), ADJUSTED_NAME);
        assert_eq!(decode(&out), decode(&asset));
    }

    #[tokio::test]
    async fn test_region_gain_touches_only_region() {
        let engine = Arc::new(NativeEngine::new());
        let gateway = TranscodeGateway::with_engine(engine.clone());
        let asset = ramp_asset(2.0, 8000);
        let original = decode(&asset);

        let half = GainLevel::new(0.5).unwrap();
        let out = gateway
            .apply_gain(&asset, half, Some(TimeRange::new(0.5, 1.5)))
            .await
            .unwrap();
        let adjusted = decode(&out);

        assert_eq!(adjusted.frames(), original.frames());
        let (a, b) = (original.frame_at(0.5), original.frame_at(1.5));
        assert_eq!(adjusted.samples[..a], original.samples[..a]);
        assert_eq!(adjusted.samples[b..], original.samples[b..]);
        assert!(adjusted.samples[a..b]
            .iter()
            .zip(&original.samples[a..b])
            .all(|(x, y)| (x - y * 0.5).abs() <= 1.0 / 32768.0));
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_region_gain_round_trip() {
        let gateway = TranscodeGateway::with_engine(Arc::new(NativeEngine::new()));
        let asset = ramp_asset(2.0, 8000);
        let region = Some(TimeRange::new(0.0, 1.0));

        let down = gateway
            .apply_gain(&asset, GainLevel::new(0.5).unwrap(), region)
            .await
            .unwrap();
        let up = gateway
            .apply_gain(&down, GainLevel::new(2.0).unwrap(), region)
            .await
            .unwrap();

        let original = decode(&asset);
        let restored = decode(&up);
        assert_eq!(restored.frames(), original.frames());
        assert!(restored
            .samples
            .iter()
            .zip(&original.samples)
            .all(|(x, y)| (x - y).abs() <= 2.0 / 32768.0));
    }

    #[test]
    fn test_region_commands_elide_edges() {
        let cycle = Cycle::new();
        let full = region_commands(&cycle, "in.wav", TimeRange::new(0.0, 10.0), 10.0, 2.0);
        // middle trim, volume, concat
        assert_eq!(full.len(), 3);

        let inner = region_commands(&cycle, "in.wav", TimeRange::new(2.0, 5.0), 10.0, 2.0);
        assert_eq!(inner.len(), 5);
        match inner.last().unwrap() {
            EngineCommand::Concat { inputs, .. } => assert_eq!(inputs.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_engine_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let gateway = TranscodeGateway::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Arc::new(NativeEngine::new()) as Arc<dyn TranscodeEngine>) })
        }));
        assert!(!gateway.is_initialized());

        let asset = ramp_asset(1.0, 8000);
        gateway.crop(&asset, 0.0, 0.5).await.unwrap();
        gateway.apply_gain(&asset, GainLevel::UNITY, None).await.unwrap();

        assert!(gateway.is_initialized());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_engine_is_reported() {
        let gateway = TranscodeGateway::new(Box::new(|| {
            Box::pin(async { Err(EngineError::Unavailable("no backend".into())) })
        }));
        let err = gateway
            .crop(&ramp_asset(1.0, 8000), 0.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::Engine(EngineError::Unavailable(_))
        ));
    }
}
