//! Bounded, single-branch undo history of (asset, gain) snapshots.
//!
//! - `commit` drops any entries after the current position, appends, and
//!   evicts the oldest entry once the capacity is exceeded.
//! - `undo` steps back one entry; at position 0 it does nothing.
//! - There is no redo. Committing after an undo discards the abandoned
//!   future permanently.

use chrono::{DateTime, Utc};
use clipcut_types::GainLevel;
use std::collections::VecDeque;

use crate::asset::AudioAsset;

/// Default number of snapshots kept
pub const HISTORY_CAPACITY: usize = 5;

/// A committed point in the undo timeline
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub asset: AudioAsset,
    pub gain: GainLevel,
    pub committed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(asset: AudioAsset, gain: GainLevel) -> Self {
        Self {
            asset,
            gain,
            committed_at: Utc::now(),
        }
    }
}

/// Where the position sits relative to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Empty,
    AtHead,
    /// At least one undo since the last commit
    AtOlder,
}

#[derive(Debug, Clone)]
pub struct EditHistory {
    entries: VecDeque<HistoryEntry>,
    /// `None` iff `entries` is empty
    position: Option<usize>,
    capacity: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl EditHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            position: None,
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from persisted entries (oldest first).
    ///
    /// Keeps the newest `capacity` entries and clamps the position into range.
    pub fn from_entries(capacity: usize, entries: Vec<HistoryEntry>, position: usize) -> Self {
        let mut history = Self::new(capacity);
        let overflow = entries.len().saturating_sub(history.capacity);
        history.entries.extend(entries.into_iter().skip(overflow));

        if !history.entries.is_empty() {
            let pos = position.saturating_sub(overflow);
            history.position = Some(pos.min(history.entries.len() - 1));
        }
        history
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current position, `-1` when empty
    pub fn position(&self) -> i32 {
        self.position.map(|p| p as i32).unwrap_or(-1)
    }

    pub fn state(&self) -> HistoryState {
        match self.position {
            None => HistoryState::Empty,
            Some(p) if p + 1 == self.entries.len() => HistoryState::AtHead,
            Some(_) => HistoryState::AtOlder,
        }
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.position.and_then(|p| self.entries.get(p))
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.position, Some(p) if p > 0)
    }

    /// Record a new edit. Always lands at the head.
    pub fn commit(&mut self, asset: AudioAsset, gain: GainLevel) -> &HistoryEntry {
        if let Some(p) = self.position {
            let discarded = self.entries.len() - (p + 1);
            if discarded > 0 {
                tracing::debug!(discarded, "Dropping undone entries before commit");
            }
            self.entries.truncate(p + 1);
        }

        self.entries.push_back(HistoryEntry::new(asset, gain));

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            tracing::debug!("History full, evicted oldest entry");
        }

        let head = self.entries.len() - 1;
        self.position = Some(head);

        tracing::debug!(
            len = self.entries.len(),
            position = head,
            gain = gain.value(),
            "History entry committed"
        );

        &self.entries[head]
    }

    /// Step back one entry. Returns `None` at the boundary.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        match self.position {
            Some(p) if p > 0 => {
                self.position = Some(p - 1);
                tracing::debug!(position = p - 1, "Undo");
                self.entries.get(p - 1)
            }
            _ => None,
        }
    }

    /// Replace everything with a single entry at unity gain
    pub fn reset_to(&mut self, asset: AudioAsset) {
        self.entries.clear();
        self.entries.push_back(HistoryEntry::new(asset, GainLevel::UNITY));
        self.position = Some(0);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = None;
    }
}
