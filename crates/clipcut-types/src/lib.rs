//! Shared types for clipcut
//!
//! This crate contains the data structures exchanged between the editor
//! core, the transcode worker process and the browser bridge.
//!
//! Types are annotated with `#[ts(export)]` for TypeScript generation via ts-rs.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Timeline Types
// ============================================================================

/// Tolerance used when comparing region bounds against an asset duration.
pub const TIME_EPSILON: f64 = 1e-6;

/// A half-open time range `[start, end)` in seconds.
///
/// `start == end == 0` is the cleared sentinel emitted by the waveform
/// component when a selection is removed; it means "no selection".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TimeRange {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The cleared sentinel
    pub fn cleared() -> Self {
        Self { start: 0.0, end: 0.0 }
    }

    pub fn is_cleared(&self) -> bool {
        self.start == 0.0 && self.end == 0.0
    }

    /// Length of the range in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check `0 <= start < end` with finite bounds
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }

    /// Check that the range is well formed and fits inside `duration`
    pub fn fits_within(&self, duration: f64) -> bool {
        self.is_well_formed() && self.end <= duration + TIME_EPSILON
    }
}

// ============================================================================
// Gain Types
// ============================================================================

/// Linear amplitude multiplier in `[0, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(try_from = "f64", into = "f64")]
pub struct GainLevel(f64);

impl GainLevel {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 5.0;
    pub const UNITY: GainLevel = GainLevel(1.0);

    /// Create a gain level, returning `None` outside `[0, 5]` or for NaN
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_unity(&self) -> bool {
        self.0 == 1.0
    }

    /// Decibel value, `-inf` for silence
    pub fn to_db(&self) -> f64 {
        20.0 * self.0.log10()
    }

    /// Display label as shown next to the gain control, e.g. `"+3.5 dB"`
    pub fn db_label(&self) -> String {
        if self.0 == 0.0 {
            "-∞ dB".to_string()
        } else {
            format!("{:.1} dB", self.to_db())
        }
    }
}

impl Default for GainLevel {
    fn default() -> Self {
        Self::UNITY
    }
}

impl TryFrom<f64> for GainLevel {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("gain {} outside [0, 5]", value))
    }
}

impl From<GainLevel> for f64 {
    fn from(gain: GainLevel) -> Self {
        gain.0
    }
}

impl std::fmt::Display for GainLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Asset Types
// ============================================================================

/// Asset metadata without the payload (for UI and status output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Duration in seconds, when the payload could be probed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Read-only view of an editing session, published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetInfo>,
    pub display_name: String,
    pub gain: GainLevel,
    pub gain_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<TimeRange>,
    pub history_len: u32,
    /// `-1` when history is empty
    pub history_position: i32,
    pub is_processing: bool,
    pub can_undo: bool,
}

// ============================================================================
// Transcode Engine Types
// ============================================================================

/// Command understood by a transcode engine.
///
/// Inputs and outputs are names in the engine's scratch file space.
/// Every output is 16-bit PCM WAV regardless of the input codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EngineCommand {
    /// Keep `duration` seconds starting at `offset` (to the end when `None`)
    Trim {
        input: String,
        output: String,
        offset: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    /// Multiply every sample by `gain`
    Volume {
        input: String,
        output: String,
        gain: f64,
    },
    /// Join inputs end to end, in order
    Concat { inputs: Vec<String>, output: String },
}

impl EngineCommand {
    /// Name of the file the command produces
    pub fn output(&self) -> &str {
        match self {
            EngineCommand::Trim { output, .. }
            | EngineCommand::Volume { output, .. }
            | EngineCommand::Concat { output, .. } => output,
        }
    }
}

// ============================================================================
// Worker IPC Types
// ============================================================================

/// Worker command for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Store a named input buffer
    WriteFile {
        name: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Fetch a named buffer
    ReadFile { name: String },
    /// Drop a named buffer
    DeleteFile { name: String },
    /// Run an engine command
    Exec { command: EngineCommand },
    /// Shutdown worker
    Shutdown,
}

/// Worker response for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    /// Contents of a named buffer
    File {
        name: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Error
    Error { message: String },
    /// Acknowledgement
    Ok,
}

// ============================================================================
// Bridge Message Types
// ============================================================================

/// A complete file pushed by another origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SharedAudioData {
    pub filename: String,
    pub file_type: String,
    #[serde(with = "base64_bytes")]
    #[ts(type = "string")]
    pub array_buffer: Vec<u8>,
}

/// Messages accepted from an allow-listed origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "SAVE_AUDIO_DATA")]
    SaveAudioData {
        #[serde(rename = "messageId")]
        message_id: String,
        data: SharedAudioData,
    },
    #[serde(rename = "SHARED_AUDIO_FILE")]
    SharedAudioFile {
        filename: String,
        #[serde(rename = "fileType")]
        file_type: String,
        #[serde(rename = "arrayBuffer", with = "base64_bytes")]
        #[ts(type = "string")]
        array_buffer: Vec<u8>,
    },
    #[serde(rename = "SHARED_AUDIO_CHUNK")]
    SharedAudioChunk {
        #[serde(rename = "chunkIndex")]
        chunk_index: u32,
        #[serde(rename = "totalChunks")]
        total_chunks: u32,
        #[serde(with = "base64_bytes")]
        #[ts(type = "string")]
        chunk: Vec<u8>,
        filename: String,
        #[serde(rename = "fileType")]
        file_type: String,
    },
}

/// Acknowledgements posted back to the sending window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "BRIDGE_READY")]
    BridgeReady,
    #[serde(rename = "AUDIO_DATA_SAVED")]
    AudioDataSaved {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "AUDIO_DATA_ERROR")]
    AudioDataError {
        #[serde(rename = "messageId")]
        message_id: String,
        error: String,
    },
}

/// A message together with the origin it was posted from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginMessage {
    pub origin: String,
    pub data: InboundMessage,
}

/// Serde helper: binary payloads travel as base64 strings inside JSON
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_bounds() {
        assert!(GainLevel::new(0.0).is_some());
        assert!(GainLevel::new(5.0).is_some());
        assert!(GainLevel::new(5.01).is_none());
        assert!(GainLevel::new(-0.1).is_none());
        assert!(GainLevel::new(f64::NAN).is_none());
    }

    #[test]
    fn test_gain_db_label() {
        assert_eq!(GainLevel::UNITY.db_label(), "0.0 dB");
        assert_eq!(GainLevel::new(0.0).unwrap().db_label(), "-∞ dB");
        assert_eq!(GainLevel::new(2.0).unwrap().db_label(), "6.0 dB");
        assert_eq!(GainLevel::new(0.5).unwrap().db_label(), "-6.0 dB");
    }

    #[test]
    fn test_gain_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<GainLevel>("7.5").is_err());
        let gain: GainLevel = serde_json::from_str("1.5").unwrap();
        assert_eq!(gain.value(), 1.5);
    }

    #[test]
    fn test_cleared_range() {
        let cleared = TimeRange::cleared();
        assert!(cleared.is_cleared());
        assert!(!cleared.is_well_formed());
        assert!(TimeRange::new(2.0, 4.0).fits_within(10.0));
        assert!(!TimeRange::new(2.0, 11.0).fits_within(10.0));
    }

    #[test]
    fn test_inbound_chunk_wire_format() {
        let json = r#"{
            "type": "SHARED_AUDIO_CHUNK",
            "chunkIndex": 1,
            "totalChunks": 3,
            "chunk": "AQID",
            "filename": "take.wav",
            "fileType": "audio/wav"
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            InboundMessage::SharedAudioChunk {
                chunk_index: 1,
                total_chunks: 3,
                chunk: vec![1, 2, 3],
                filename: "take.wav".to_string(),
                file_type: "audio/wav".to_string(),
            }
        );
    }

    #[test]
    fn test_outbound_ack_wire_format() {
        let ack = OutboundMessage::AudioDataSaved {
            message_id: "m-1".to_string(),
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "AUDIO_DATA_SAVED");
        assert_eq!(json["messageId"], "m-1");
    }

    #[test]
    fn test_engine_command_output() {
        let cmd = EngineCommand::Concat {
            inputs: vec!["a.wav".into(), "b.wav".into()],
            output: "joined.wav".into(),
        };
        assert_eq!(cmd.output(), "joined.wav");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["op"], "concat");
    }
}
