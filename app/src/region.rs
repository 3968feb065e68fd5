//! Region selection over the current asset
//!
//! The waveform component is the only producer of numeric bounds. This model
//! validates and stores them and answers what a gain edit should target.
//! Duration is never owned here; callers pass it in with each event.

use clipcut_types::TimeRange;

use crate::error::{EditorError, Result};

/// Shortest span a two-tap selection may produce, in seconds
pub const MIN_TAP_SPAN: f64 = 0.1;

/// What a gain edit applies to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainTarget {
    Whole,
    Region(TimeRange),
}

/// Pending, uncommitted selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionModel {
    region: Option<TimeRange>,
    /// First tap of a touch selection in progress
    tap_anchor: Option<f64>,
}

impl RegionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a selection.
    ///
    /// The cleared sentinel `(0, 0)` is accepted and means "no selection".
    pub fn set_region(&mut self, start: f64, end: f64, duration: Option<f64>) -> Result<()> {
        let range = TimeRange::new(start, end);
        if range.is_cleared() {
            self.clear_region();
            return Ok(());
        }

        if !range.is_well_formed() {
            return Err(EditorError::validation(format!(
                "Invalid region [{}, {}): need 0 <= start < end",
                start, end
            )));
        }

        if let Some(duration) = duration {
            if !range.fits_within(duration) {
                return Err(EditorError::validation(format!(
                    "Region [{:.3}, {:.3}) exceeds duration {:.3}s",
                    start, end, duration
                )));
            }
        }

        tracing::debug!("Region set to [{:.3}, {:.3})", start, end);
        self.region = Some(range);
        Ok(())
    }

    /// Drop the selection. Idempotent.
    pub fn clear_region(&mut self) {
        if self.region.take().is_some() {
            tracing::debug!("Region cleared");
        }
    }

    pub fn region(&self) -> Option<TimeRange> {
        self.region
    }

    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    pub fn gain_target(&self) -> GainTarget {
        match self.region {
            Some(range) => GainTarget::Region(range),
            None => GainTarget::Whole,
        }
    }

    /// Toggle button behaviour: remove an existing selection, otherwise
    /// select the middle half of the asset.
    pub fn toggle(&mut self, duration: f64) -> Option<TimeRange> {
        self.tap_anchor = None;

        if self.region.is_some() {
            self.clear_region();
            return None;
        }

        if !(duration.is_finite() && duration > 0.0) {
            return None;
        }

        let range = TimeRange::new(duration * 0.25, duration * 0.75);
        self.region = Some(range);
        Some(range)
    }

    /// Two-tap touch selection.
    ///
    /// The first tap records an anchor and removes any existing selection.
    /// The second tap selects between the two taps when they are more than
    /// [`MIN_TAP_SPAN`] apart; the anchor is reset either way.
    pub fn tap(&mut self, time: f64, duration: f64) -> Option<TimeRange> {
        let time = time.clamp(0.0, duration.max(0.0));

        match self.tap_anchor.take() {
            None => {
                self.tap_anchor = Some(time);
                self.clear_region();
                None
            }
            Some(anchor) => {
                let start = anchor.min(time);
                let end = anchor.max(time);
                if end - start > MIN_TAP_SPAN {
                    let range = TimeRange::new(start, end);
                    self.region = Some(range);
                    Some(range)
                } else {
                    None
                }
            }
        }
    }

    /// Whether a two-tap selection is waiting for its second tap
    pub fn is_selecting(&self) -> bool {
        self.tap_anchor.is_some()
    }
}
