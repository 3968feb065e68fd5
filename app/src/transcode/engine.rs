//! Transcode engine boundary
//!
//! An engine is a command-style processor with its own named file space:
//! write inputs, run commands, read outputs, delete what was written.

use async_trait::async_trait;
use clipcut_types::EngineCommand;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("No such file in engine: {0}")]
    NotFound(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        EngineError::Failed(err.to_string())
    }
}

/// Names are flat: no separators, no parent references
pub fn validate_file_name(name: &str) -> Result<(), EngineError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidName(name.to_string()))
    }
}

/// Command-style audio processor.
///
/// Implementations are not required to tolerate overlapping operations;
/// the session guarantees a single edit in flight.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Engine name (for logs)
    fn name(&self) -> &str;

    /// Store a named input buffer
    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError>;

    /// Fetch a named buffer
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Remove a named buffer; missing files are not an error
    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Run a command against the file space
    async fn exec(&self, command: &EngineCommand) -> Result<(), EngineError>;

    /// Hook run before each gateway operation, between complete cycles.
    /// Engines that periodically restart a backend do it here.
    async fn recycle(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("input_1.wav").is_ok());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("a/b.wav").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("").is_err());
    }
}
