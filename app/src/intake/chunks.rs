//! Reassembly of chunked transfers
//!
//! Chunks are keyed by index, so delivery order does not matter. A transfer
//! completes when every index in `0..total` has arrived.

use clipcut_types::SharedAudioData;
use std::collections::BTreeMap;

use crate::error::IntakeError;

#[derive(Debug)]
struct PendingTransfer {
    filename: String,
    file_type: String,
    total: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl PendingTransfer {
    fn describe(&self) -> String {
        format!("{} ({} chunks)", self.filename, self.total)
    }
}

#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: Option<PendingTransfer>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks received for the pending transfer, and its declared total
    pub fn progress(&self) -> Option<(usize, u32)> {
        self.pending.as_ref().map(|p| (p.chunks.len(), p.total))
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Add a chunk. Returns the whole file once the last missing chunk lands.
    ///
    /// Any inconsistency fails the transfer and clears the buffer. A repeated
    /// index replaces the earlier chunk.
    pub fn push(
        &mut self,
        index: u32,
        total: u32,
        chunk: Vec<u8>,
        filename: &str,
        file_type: &str,
    ) -> Result<Option<SharedAudioData>, IntakeError> {
        if total == 0 {
            self.clear();
            return Err(IntakeError::EmptyTransfer);
        }
        if index >= total {
            self.clear();
            return Err(IntakeError::ChunkOutOfRange { index, total });
        }

        if let Some(pending) = &self.pending {
            if pending.filename != filename || pending.total != total {
                let expected = pending.describe();
                self.clear();
                return Err(IntakeError::TransferMismatch {
                    expected,
                    got: format!("{} ({} chunks)", filename, total),
                });
            }
        }

        let pending = self.pending.get_or_insert_with(|| {
            tracing::debug!("Starting chunked transfer of {} ({} chunks)", filename, total);
            PendingTransfer {
                filename: filename.to_string(),
                file_type: file_type.to_string(),
                total,
                chunks: BTreeMap::new(),
            }
        });

        if pending.chunks.insert(index, chunk).is_some() {
            tracing::debug!("Chunk {} of {} received twice; keeping the latest", index, filename);
        }

        if pending.chunks.len() < total as usize {
            return Ok(None);
        }

        let Some(done) = self.pending.take() else {
            return Ok(None);
        };
        let size: usize = done.chunks.values().map(|c| c.len()).sum();
        let mut data = Vec::with_capacity(size);
        for chunk in done.chunks.into_values() {
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(IntakeError::EmptyPayload(done.filename));
        }

        tracing::info!("Reassembled {} ({} bytes)", done.filename, data.len());
        Ok(Some(SharedAudioData {
            filename: done.filename,
            file_type: done.file_type,
            array_buffer: data,
        }))
    }
}
