//! Shareable session state encoded as a URL query
//!
//! Only `gain`, `regionStart` and `regionEnd` are owned here; any other
//! parameter is carried through untouched.

use clipcut_types::{GainLevel, TimeRange};
use url::form_urlencoded;

pub const GAIN_KEY: &str = "gain";
pub const REGION_START_KEY: &str = "regionStart";
pub const REGION_END_KEY: &str = "regionEnd";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareState {
    gain: Option<GainLevel>,
    region: Option<TimeRange>,
    /// Unrelated parameters, in original order
    extra: Vec<(String, String)>,
}

impl ShareState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without the leading `?`.
    ///
    /// Invalid values are dropped with a warning. The region is only taken
    /// when both keys are present and form a well-formed range.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = Self::default();
        let mut start: Option<f64> = None;
        let mut end: Option<f64> = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                GAIN_KEY => match value.parse::<f64>().ok().and_then(GainLevel::new) {
                    Some(gain) => state.gain = Some(gain),
                    None => tracing::warn!("Ignoring invalid gain in share state: {}", value),
                },
                REGION_START_KEY => start = parse_time(&key, &value),
                REGION_END_KEY => end = parse_time(&key, &value),
                _ => state.extra.push((key.into_owned(), value.into_owned())),
            }
        }

        match (start, end) {
            (Some(start), Some(end)) => {
                let range = TimeRange::new(start, end);
                if range.is_well_formed() && !range.is_cleared() {
                    state.region = Some(range);
                } else {
                    tracing::warn!("Ignoring invalid region in share state: {}..{}", start, end);
                }
            }
            (None, None) => {}
            _ => tracing::warn!("Ignoring share state region with only one bound"),
        }

        state
    }

    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.extra {
            serializer.append_pair(key, value);
        }
        if let Some(gain) = self.gain {
            serializer.append_pair(GAIN_KEY, &gain.value().to_string());
        }
        if let Some(range) = self.region {
            serializer.append_pair(REGION_START_KEY, &range.start.to_string());
            serializer.append_pair(REGION_END_KEY, &range.end.to_string());
        }
        serializer.finish()
    }

    pub fn gain(&self) -> Option<GainLevel> {
        self.gain
    }

    pub fn region(&self) -> Option<TimeRange> {
        self.region
    }

    pub fn is_empty(&self) -> bool {
        self.gain.is_none() && self.region.is_none() && self.extra.is_empty()
    }

    pub fn on_gain(&mut self, gain: GainLevel) {
        self.gain = Some(gain);
    }

    /// The cleared sentinel removes both region keys
    pub fn on_region(&mut self, region: Option<TimeRange>) {
        self.region = region.filter(|r| !r.is_cleared());
    }

    pub fn on_crop(&mut self) {
        self.region = None;
    }

    /// "New File" clears the whole query
    pub fn on_reset(&mut self) {
        *self = Self::default();
    }
}

fn parse_time(key: &str, value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(t) if t.is_finite() => Some(t),
        _ => {
            tracing::warn!("Ignoring invalid {} in share state: {}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_state() {
        let state = ShareState::parse("?gain=1.5&regionStart=2&regionEnd=4.25");
        assert_eq!(state.gain(), GainLevel::new(1.5));
        assert_eq!(state.region(), Some(TimeRange::new(2.0, 4.25)));
    }

    #[test]
    fn test_lone_region_key_is_ignored() {
        let state = ShareState::parse("regionStart=2");
        assert_eq!(state.region(), None);
        assert!(state.to_query().is_empty());
    }

    #[test]
    fn test_invalid_values_are_dropped() {
        let state = ShareState::parse("gain=9&regionStart=5&regionEnd=1");
        assert_eq!(state.gain(), None);
        assert_eq!(state.region(), None);

        let state = ShareState::parse("gain=abc&regionStart=NaN&regionEnd=3");
        assert!(state.is_empty());
    }

    #[test]
    fn test_unknown_params_survive() {
        let mut state = ShareState::parse("file=a%20b.wav&gain=2");
        state.on_gain(GainLevel::new(0.5).unwrap());
        assert_eq!(state.to_query(), "file=a+b.wav&gain=0.5");
    }

    #[test]
    fn test_region_updates() {
        let mut state = ShareState::new();
        state.on_region(Some(TimeRange::new(1.0, 3.0)));
        assert_eq!(state.to_query(), "regionStart=1&regionEnd=3");

        state.on_region(Some(TimeRange::cleared()));
        assert_eq!(state.to_query(), "");

        state.on_gain(GainLevel::UNITY);
        state.on_region(Some(TimeRange::new(1.0, 3.0)));
        state.on_crop();
        assert_eq!(state.to_query(), "gain=1");

        state.on_reset();
        assert!(state.is_empty());
    }
}
