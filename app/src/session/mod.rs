//! Editing session controller
//!
//! The controller is the only writer of session state and the only caller of
//! the transcode gateway. State lives behind a `parking_lot::Mutex` that is
//! never held across an `.await`; observers receive [`SessionEvent`]s over a
//! broadcast channel.
//!
//! At most one transcode is in flight. A second gateway-calling request is
//! rejected with [`EditorError::Busy`]. Loading a new file or resetting while
//! a transcode runs bumps the session generation, and the stale result is
//! dropped instead of being committed over the new file.

pub mod share;

use async_trait::async_trait;
use clipcut_types::{GainLevel, SessionSnapshot, TimeRange};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::asset::AudioAsset;
use crate::config::Settings;
use crate::error::{EditorError, IntakeError, Result, StorageError};
use crate::export;
use crate::history::EditHistory;
use crate::intake::AssetSink;
use crate::region::{GainTarget, RegionModel};
use crate::storage::{BlobStore, SessionStore};
use crate::transcode::{TranscodeError, TranscodeGateway};

use share::ShareState;

const EVENT_CAPACITY: usize = 64;

/// Edits that go through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Crop,
    Gain,
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditKind::Crop => write!(f, "crop"),
            EditKind::Gain => write!(f, "gain"),
        }
    }
}

/// Notifications for observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    ProcessingStarted(EditKind),
    ProcessingFinished(EditKind),
    EditFailed { kind: EditKind, message: String },
    /// A durable write failed; memory state was kept
    PersistFailed(String),
}

/// Aggregate root
#[derive(Debug)]
struct EditSession {
    display_name: String,
    /// Pending gain, not yet applied
    gain: GainLevel,
    region: RegionModel,
    history: EditHistory,
    is_processing: bool,
    /// Bumped whenever the current file is replaced or dropped
    generation: u64,
    share: ShareState,
}

impl EditSession {
    fn new(capacity: usize) -> Self {
        Self {
            display_name: String::new(),
            gain: GainLevel::UNITY,
            region: RegionModel::new(),
            history: EditHistory::new(capacity),
            is_processing: false,
            generation: 0,
            share: ShareState::new(),
        }
    }

    fn current_asset(&self) -> Option<&AudioAsset> {
        self.history.current().map(|e| &e.asset)
    }

    fn duration(&self) -> Option<f64> {
        self.current_asset().and_then(|a| a.duration())
    }

    /// Drop the file. An in-flight transcode keeps `is_processing` set until
    /// it returns, so engine calls never overlap.
    fn clear(&mut self) {
        self.display_name.clear();
        self.gain = GainLevel::UNITY;
        self.region = RegionModel::new();
        self.history.clear();
        self.generation += 1;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            asset: self.current_asset().map(|a| a.info()),
            display_name: self.display_name.clone(),
            gain: self.gain,
            gain_label: self.gain.db_label(),
            region: self.region.region(),
            history_len: self.history.len() as u32,
            history_position: self.history.position(),
            is_processing: self.is_processing,
            can_undo: self.history.can_undo() && !self.is_processing,
        }
    }
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    session: Mutex<EditSession>,
    gateway: TranscodeGateway,
    store: SessionStore,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes durable writes in commit order
    persist_lock: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub fn new(gateway: TranscodeGateway, store: Arc<dyn BlobStore>, history_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                session: Mutex::new(EditSession::new(history_capacity)),
                gateway,
                store: SessionStore::new(store, history_capacity),
                events,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<dyn BlobStore>) -> Self {
        Self::new(
            TranscodeGateway::from_settings(settings),
            store,
            settings.history_capacity,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().snapshot()
    }

    pub fn current_asset(&self) -> Option<AudioAsset> {
        self.inner.session.lock().current_asset().cloned()
    }

    /// Current share state as a query string
    pub fn share_query(&self) -> String {
        self.inner.session.lock().share.to_query()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn emit_state(&self) {
        let snapshot = self.snapshot();
        self.emit(SessionEvent::StateChanged(snapshot));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Rebuild the session from storage. Returns whether anything was stored.
    pub async fn restore(&self) -> Result<bool> {
        let Some(restored) = self.inner.store.load().await? else {
            tracing::debug!("No stored session to restore");
            return Ok(false);
        };

        {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            let capacity = s.history.capacity();

            // A negative position means none was stored: take the newest
            let position = usize::try_from(restored.position).unwrap_or(usize::MAX);
            s.history = if restored.entries.is_empty() {
                let mut history = EditHistory::new(capacity);
                history.reset_to(restored.current.clone());
                history
            } else {
                EditHistory::from_entries(capacity, restored.entries, position)
            };

            if s.current_asset() != Some(&restored.current) {
                tracing::warn!("Stored current asset differs from its history entry; using history");
            }

            s.gain = s.history.current().map(|e| e.gain).unwrap_or_default();
            s.region = RegionModel::new();
            s.display_name = restored.display_name;
            s.generation += 1;

            tracing::info!(
                "Restored session {} at history position {}",
                s.display_name,
                s.history.position()
            );
        }

        self.emit_state();
        Ok(true)
    }

    /// Replace the session with a freshly loaded file
    pub async fn load_file(&self, asset: AudioAsset) -> Result<()> {
        if !asset.is_audio() {
            return Err(EditorError::validation(format!(
                "{} is not an audio file ({})",
                asset.name(),
                asset.mime_type()
            )));
        }
        if asset.size_bytes() == 0 {
            return Err(EditorError::validation(format!("{} is empty", asset.name())));
        }

        {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            if s.is_processing {
                tracing::info!("Loading a new file while an edit is processing; its result will be discarded");
            }
            s.generation += 1;
            s.display_name = asset.name().to_string();
            s.gain = GainLevel::UNITY;
            s.region = RegionModel::new();
            s.history.reset_to(asset);
            s.share.on_gain(GainLevel::UNITY);
            s.share.on_region(None);

            tracing::info!(
                "Loaded {} ({} bytes, duration {:?})",
                s.display_name,
                s.current_asset().map(|a| a.size_bytes()).unwrap_or(0),
                s.duration()
            );
        }

        self.emit_state();
        self.persist().await;
        Ok(())
    }

    /// "New File": clear everything and purge storage.
    ///
    /// Memory is cleared even when the purge fails; the error is returned.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut s = self.inner.session.lock();
            s.clear();
            s.share.on_reset();
        }
        tracing::info!("Session reset");
        self.emit_state();

        let _guard = self.inner.persist_lock.lock().await;
        if let Err(e) = self.inner.store.purge().await {
            tracing::warn!("Failed to purge stored session: {}", e);
            self.emit(SessionEvent::PersistFailed(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Seed gain and region from a shared query. Never triggers a transcode.
    pub fn seed_from_share(&self, share: ShareState) {
        {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;

            if let Some(gain) = share.gain() {
                s.gain = gain;
            }
            if let Some(range) = share.region() {
                let duration = s.duration();
                if let Err(e) = s.region.set_region(range.start, range.end, duration) {
                    tracing::warn!("Ignoring shared region: {}", e);
                }
            }

            let mut merged = share;
            merged.on_gain(s.gain);
            merged.on_region(s.region.region());
            s.share = merged;
        }
        self.emit_state();
    }

    // ------------------------------------------------------------------
    // Pending state
    // ------------------------------------------------------------------

    pub fn set_gain(&self, value: f64) -> Result<()> {
        let gain = GainLevel::new(value).ok_or_else(|| {
            EditorError::validation(format!(
                "Gain must be between {} and {}, got {}",
                GainLevel::MIN,
                GainLevel::MAX,
                value
            ))
        })?;
        {
            let mut s = self.inner.session.lock();
            s.gain = gain;
            s.share.on_gain(gain);
        }
        tracing::debug!("Pending gain set to {} ({})", gain, gain.db_label());
        self.emit_state();
        Ok(())
    }

    /// Back to unity gain
    pub fn reset_gain(&self) {
        {
            let mut s = self.inner.session.lock();
            s.gain = GainLevel::UNITY;
            s.share.on_gain(GainLevel::UNITY);
        }
        self.emit_state();
    }

    pub async fn set_display_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditorError::validation("Display name cannot be empty"));
        }
        let loaded = {
            let mut s = self.inner.session.lock();
            s.display_name = name.to_string();
            s.current_asset().is_some()
        };
        self.emit_state();
        if loaded {
            self.persist().await;
        }
        Ok(())
    }

    /// Store a selection reported by the waveform; `(0, 0)` clears it
    pub fn set_region(&self, start: f64, end: f64) -> Result<()> {
        {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            if s.current_asset().is_none() {
                return Err(EditorError::validation("No audio loaded"));
            }
            let duration = s.duration();
            s.region.set_region(start, end, duration)?;
            s.share.on_region(s.region.region());
        }
        self.emit_state();
        Ok(())
    }

    pub fn clear_region(&self) {
        {
            let mut s = self.inner.session.lock();
            s.region.clear_region();
            s.share.on_region(None);
        }
        self.emit_state();
    }

    /// Toggle between no selection and the default middle-half selection
    pub fn toggle_region(&self) -> Result<Option<TimeRange>> {
        let range = {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            let duration = s.duration().ok_or_else(|| {
                EditorError::validation("Audio duration is unknown; cannot select a region")
            })?;
            let range = s.region.toggle(duration);
            s.share.on_region(range);
            range
        };
        self.emit_state();
        Ok(range)
    }

    /// Touch selection: first tap anchors, second tap selects
    pub fn tap(&self, time: f64) -> Result<Option<TimeRange>> {
        let range = {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            let duration = s.duration().ok_or_else(|| {
                EditorError::validation("Audio duration is unknown; cannot select a region")
            })?;
            let range = s.region.tap(time, duration);
            s.share.on_region(s.region.region());
            range
        };
        self.emit_state();
        Ok(range)
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Keep only the selected region
    pub async fn request_crop(&self) -> Result<()> {
        let (asset, range, generation, gain) = {
            let mut s = self.inner.session.lock();
            if s.is_processing {
                return Err(EditorError::Busy);
            }
            let asset = s
                .current_asset()
                .cloned()
                .ok_or_else(|| EditorError::validation("No audio loaded"))?;
            let range = s
                .region
                .region()
                .ok_or_else(|| EditorError::validation("No region selected"))?;
            s.is_processing = true;
            (asset, range, s.generation, s.gain)
        };

        self.emit(SessionEvent::ProcessingStarted(EditKind::Crop));
        self.emit_state();

        let result = self.inner.gateway.crop(&asset, range.start, range.end).await;

        self.finish_edit(EditKind::Crop, generation, gain, result, |s| {
            s.region.clear_region();
            s.share.on_crop();
        })
        .await
    }

    /// Apply the pending gain to the selection, or to everything without one
    pub async fn request_gain_apply(&self) -> Result<()> {
        let (asset, target, generation, gain) = {
            let mut s = self.inner.session.lock();
            if s.is_processing {
                return Err(EditorError::Busy);
            }
            let asset = s
                .current_asset()
                .cloned()
                .ok_or_else(|| EditorError::validation("No audio loaded"))?;
            s.is_processing = true;
            (asset, s.region.gain_target(), s.generation, s.gain)
        };

        self.emit(SessionEvent::ProcessingStarted(EditKind::Gain));
        self.emit_state();

        let region = match target {
            GainTarget::Whole => None,
            GainTarget::Region(range) => Some(range),
        };
        let result = self.inner.gateway.apply_gain(&asset, gain, region).await;

        self.finish_edit(EditKind::Gain, generation, gain, result, move |s| {
            if region.is_some() {
                s.region.clear_region();
                s.share.on_region(None);
            }
        })
        .await
    }

    /// Step back one entry; `Ok(false)` at the oldest entry
    pub async fn request_undo(&self) -> Result<bool> {
        let changed = {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            if s.is_processing {
                return Err(EditorError::Busy);
            }
            match s.history.undo() {
                Some(entry) => {
                    s.gain = entry.gain;
                    // Bounds of the newer asset do not apply to the older one
                    s.region.clear_region();
                    s.share.on_gain(s.gain);
                    s.share.on_region(None);
                    true
                }
                None => false,
            }
        };

        if changed {
            self.emit_state();
            self.persist().await;
        } else {
            tracing::debug!("Nothing to undo");
        }
        Ok(changed)
    }

    async fn finish_edit(
        &self,
        kind: EditKind,
        generation: u64,
        gain: GainLevel,
        result: std::result::Result<AudioAsset, TranscodeError>,
        on_commit: impl FnOnce(&mut EditSession),
    ) -> Result<()> {
        let outcome = {
            let mut guard = self.inner.session.lock();
            let s = &mut *guard;
            s.is_processing = false;

            if s.generation != generation {
                tracing::info!("Discarding {} result: the session changed while it ran", kind);
                Err(EditorError::Superseded)
            } else {
                match result {
                    Ok(asset) => {
                        s.history.commit(asset, gain);
                        on_commit(s);
                        Ok(())
                    }
                    Err(e) => Err(EditorError::from(e)),
                }
            }
        };

        self.emit(SessionEvent::ProcessingFinished(kind));

        match outcome {
            Ok(()) => {
                tracing::info!("{} committed", kind);
                self.emit_state();
                self.persist().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", kind, e);
                self.emit(SessionEvent::EditFailed {
                    kind,
                    message: e.to_string(),
                });
                self.emit_state();
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence and export
    // ------------------------------------------------------------------

    /// Write history and current asset; failures are reported, never rolled back
    async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            tracing::warn!("Failed to persist session: {}", e);
            self.emit(SessionEvent::PersistFailed(e.to_string()));
        }
    }

    async fn try_persist(&self) -> std::result::Result<(), StorageError> {
        let _guard = self.inner.persist_lock.lock().await;

        // Snapshot after taking the lock so the last writer holds the newest state
        let (current, display_name, entries, position) = {
            let s = self.inner.session.lock();
            let Some(current) = s.current_asset().cloned() else {
                return Ok(());
            };
            (
                current,
                s.display_name.clone(),
                s.history.entries().cloned().collect::<Vec<_>>(),
                s.history.position(),
            )
        };

        self.inner
            .store
            .save(&current, &display_name, &entries, position)
            .await
    }

    /// Write the current asset under `dir`, named after the display name
    pub async fn export(&self, dir: &Path) -> Result<PathBuf> {
        let (asset, display_name) = {
            let s = self.inner.session.lock();
            let asset = s
                .current_asset()
                .cloned()
                .ok_or_else(|| EditorError::validation("No audio to export"))?;
            (asset, s.display_name.clone())
        };
        export::export_asset(&asset, &display_name, dir).await
    }
}

#[async_trait]
impl AssetSink for SessionController {
    async fn deliver(&self, asset: AudioAsset) -> std::result::Result<(), IntakeError> {
        let filename = asset.name().to_string();
        self.load_file(asset)
            .await
            .map_err(|e| IntakeError::Rejected {
                filename,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use crate::transcode::NativeEngine;
    use clipcut_audio::PcmAudio;

    fn controller() -> SessionController {
        SessionController::new(
            TranscodeGateway::with_engine(Arc::new(NativeEngine::new())),
            Arc::new(MemoryBlobStore::new()),
            5,
        )
    }

    fn wav(seconds: f64) -> AudioAsset {
        let bytes = clipcut_audio::encode_wav16(&PcmAudio::silence(seconds, 8000, 1)).unwrap();
        AudioAsset::new("clip.wav", "audio/wav", bytes)
    }

    #[tokio::test]
    async fn test_load_resets_state() {
        let session = controller();
        session.load_file(wav(2.0)).await.unwrap();
        session.set_gain(2.0).unwrap();
        session.set_region(0.5, 1.0).unwrap();

        session.load_file(wav(3.0)).await.unwrap();
        let snap = session.snapshot();
        assert_eq!(snap.gain, GainLevel::UNITY);
        assert_eq!(snap.region, None);
        assert_eq!(snap.history_len, 1);
        assert_eq!(snap.history_position, 0);
        assert_eq!(snap.display_name, "clip.wav");
    }

    #[tokio::test]
    async fn test_load_rejects_non_audio() {
        let session = controller();
        let text = AudioAsset::new("notes.txt", "text/plain", b"hello".to_vec());
        assert!(matches!(
            session.load_file(text).await,
            Err(EditorError::Validation(_))
        ));
        assert!(session.snapshot().asset.is_none());
    }

    #[tokio::test]
    async fn test_crop_needs_region() {
        let session = controller();
        session.load_file(wav(2.0)).await.unwrap();
        assert!(matches!(
            session.request_crop().await,
            Err(EditorError::Validation(_))
        ));
        assert!(!session.snapshot().is_processing);
    }

    #[tokio::test]
    async fn test_region_requires_asset_and_bounds() {
        let session = controller();
        assert!(session.set_region(0.0, 1.0).is_err());

        session.load_file(wav(2.0)).await.unwrap();
        assert!(session.set_region(1.0, 3.0).is_err());
        session.set_region(0.5, 1.5).unwrap();
        session.set_region(0.0, 0.0).unwrap();
        assert_eq!(session.snapshot().region, None);
    }

    #[tokio::test]
    async fn test_toggle_and_tap() {
        let session = controller();
        session.load_file(wav(4.0)).await.unwrap();

        assert_eq!(session.toggle_region().unwrap(), Some(TimeRange::new(1.0, 3.0)));
        assert_eq!(session.toggle_region().unwrap(), None);

        assert_eq!(session.tap(0.5).unwrap(), None);
        assert_eq!(session.tap(2.5).unwrap(), Some(TimeRange::new(0.5, 2.5)));
        assert_eq!(session.share_query(), "gain=1&regionStart=0.5&regionEnd=2.5");
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let session = controller();
        let mut rx = session.subscribe();
        session.load_file(wav(1.0)).await.unwrap();
        session.request_gain_apply().await.unwrap();

        let mut started = false;
        let mut finished = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::ProcessingStarted(EditKind::Gain) => started = true,
                SessionEvent::ProcessingFinished(EditKind::Gain) => finished = true,
                _ => {}
            }
        }
        assert!(started && finished);
    }

    #[tokio::test]
    async fn test_seed_never_transcodes() {
        let session = controller();
        session.load_file(wav(4.0)).await.unwrap();
        session.seed_from_share(ShareState::parse("gain=2&regionStart=1&regionEnd=2&x=y"));

        let snap = session.snapshot();
        assert_eq!(snap.gain, GainLevel::new(2.0).unwrap());
        assert_eq!(snap.region, Some(TimeRange::new(1.0, 2.0)));
        assert_eq!(snap.history_len, 1);
        assert_eq!(session.share_query(), "x=y&gain=2&regionStart=1&regionEnd=2");
    }

    #[tokio::test]
    async fn test_seed_drops_region_outside_asset() {
        let session = controller();
        session.load_file(wav(1.0)).await.unwrap();
        session.seed_from_share(ShareState::parse("regionStart=2&regionEnd=5"));
        assert_eq!(session.snapshot().region, None);
        assert_eq!(session.share_query(), "gain=1");
    }
}
