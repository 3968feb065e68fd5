//! Error taxonomy for the editor core
//!
//! Validation errors are raised before any I/O. Transcode errors leave the
//! session untouched. Storage and intake errors never corrupt the in-memory
//! session.

use thiserror::Error;

use crate::transcode::TranscodeError;

/// Persistence failures from a blob store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Malformed or incomplete cross-origin transfers
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Chunk {index} is out of range for a {total}-chunk transfer")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("Transfer declares zero chunks")]
    EmptyTransfer,

    #[error("Chunk for {got} does not belong to the pending transfer of {expected}")]
    TransferMismatch { expected: String, got: String },

    #[error("Transferred file {0} is empty")]
    EmptyPayload(String),

    #[error("Session rejected {filename}: {reason}")]
    Rejected { filename: String, reason: String },
}

/// Top-level editor error
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Another edit is still processing")]
    Busy,

    #[error("Edit result discarded: the session changed while it was processing")]
    Superseded,

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Intake failed: {0}")]
    Intake(#[from] IntakeError),
}

impl EditorError {
    pub fn validation(message: impl Into<String>) -> Self {
        EditorError::Validation(message.into())
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
