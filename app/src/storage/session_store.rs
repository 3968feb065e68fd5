//! Session persistence on top of a [`BlobStore`]
//!
//! Every save writes the current asset record and the full bounded history.
//! Records are JSON with base64 payloads.

use chrono::{DateTime, Utc};
use clipcut_types::{base64_bytes, GainLevel};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::BlobStore;
use crate::asset::AudioAsset;
use crate::error::StorageError;
use crate::history::HistoryEntry;

pub const ASSET_NAMESPACE: &str = "asset";
pub const HISTORY_NAMESPACE: &str = "history";
pub const CURRENT_KEY: &str = "current";

fn slot_key(index: usize) -> String {
    format!("slot-{}", index)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetRecord {
    name: String,
    mime_type: String,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
    display_name: String,
    history_position: i32,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    name: String,
    mime_type: String,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
    gain: GainLevel,
    committed_at: DateTime<Utc>,
}

impl HistoryRecord {
    fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            name: entry.asset.name().to_string(),
            mime_type: entry.asset.mime_type().to_string(),
            data: entry.asset.bytes().to_vec(),
            gain: entry.gain,
            committed_at: entry.committed_at,
        }
    }

    async fn into_entry(self) -> HistoryEntry {
        HistoryEntry {
            asset: AudioAsset::probed(self.name, self.mime_type, self.data).await,
            gain: self.gain,
            committed_at: self.committed_at,
        }
    }
}

/// Session state read back from storage
#[derive(Debug, Clone)]
pub struct RestoredSession {
    pub current: AudioAsset,
    pub display_name: String,
    /// Oldest first
    pub entries: Vec<HistoryEntry>,
    /// Index into `entries`; `-1` when no history was stored
    pub position: i32,
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn BlobStore>,
    capacity: usize,
}

impl SessionStore {
    pub fn new(store: Arc<dyn BlobStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// Persist the current asset and the whole history.
    ///
    /// Slots past the end of `entries` are removed so a shorter history does
    /// not resurrect stale entries on restore.
    pub async fn save(
        &self,
        current: &AudioAsset,
        display_name: &str,
        entries: &[HistoryEntry],
        position: i32,
    ) -> Result<(), StorageError> {
        let record = AssetRecord {
            name: current.name().to_string(),
            mime_type: current.mime_type().to_string(),
            data: current.bytes().to_vec(),
            display_name: display_name.to_string(),
            history_position: position,
            saved_at: Utc::now(),
        };
        self.store
            .put(ASSET_NAMESPACE, CURRENT_KEY, serde_json::to_vec(&record)?)
            .await?;

        let encoded = entries
            .iter()
            .map(|e| serde_json::to_vec(&HistoryRecord::from_entry(e)))
            .collect::<Result<Vec<_>, _>>()?;

        try_join_all(
            encoded
                .into_iter()
                .enumerate()
                .map(|(i, bytes)| async move { self.store.put(HISTORY_NAMESPACE, &slot_key(i), bytes).await }),
        )
        .await?;

        try_join_all(
            (entries.len()..self.capacity)
                .map(|i| async move { self.store.delete(HISTORY_NAMESPACE, &slot_key(i)).await }),
        )
        .await?;

        tracing::debug!(
            "Persisted session: {} ({} history entries, position {})",
            display_name,
            entries.len(),
            position
        );
        Ok(())
    }

    /// Read the stored session, if any
    pub async fn load(&self) -> Result<Option<RestoredSession>, StorageError> {
        let Some(bytes) = self.store.get(ASSET_NAMESPACE, CURRENT_KEY).await? else {
            return Ok(None);
        };
        let record: AssetRecord =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                key: format!("{}/{}", ASSET_NAMESPACE, CURRENT_KEY),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for i in 0..self.capacity {
            let key = slot_key(i);
            let Some(bytes) = self.store.get(HISTORY_NAMESPACE, &key).await? else {
                break;
            };
            let entry: HistoryRecord =
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                    key: format!("{}/{}", HISTORY_NAMESPACE, key),
                    reason: e.to_string(),
                })?;
            entries.push(entry.into_entry().await);
        }

        tracing::info!(
            "Loaded stored session {} with {} history entries",
            record.display_name,
            entries.len()
        );

        Ok(Some(RestoredSession {
            current: AudioAsset::probed(record.name, record.mime_type, record.data).await,
            display_name: record.display_name,
            entries,
            position: record.history_position,
        }))
    }

    /// Delete the current asset and every history slot
    pub async fn purge(&self) -> Result<(), StorageError> {
        self.store.delete(ASSET_NAMESPACE, CURRENT_KEY).await?;
        self.store.clear(HISTORY_NAMESPACE).await?;
        tracing::info!("Purged stored session");
        Ok(())
    }
}
