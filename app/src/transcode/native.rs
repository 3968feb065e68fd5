//! In-process engine over `clipcut-audio`

use async_trait::async_trait;
use clipcut_audio::ScratchSpace;
use clipcut_types::EngineCommand;
use parking_lot::Mutex;
use std::sync::Arc;

use super::engine::{validate_file_name, EngineError, TranscodeEngine};

#[derive(Debug, Clone, Default)]
pub struct NativeEngine {
    space: Arc<Mutex<ScratchSpace>>,
}

impl NativeEngine {
    pub fn new() -> Self {
        tracing::info!("Native transcode engine ready");
        Self::default()
    }

    /// Number of files currently held (used to check for leftovers)
    pub fn file_count(&self) -> usize {
        self.space.lock().len()
    }
}

#[async_trait]
impl TranscodeEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError> {
        validate_file_name(name)?;
        self.space.lock().write_file(name, data);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.space
            .lock()
            .read_file(name)
            .map(|d| d.to_vec())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.space.lock().delete_file(name);
        Ok(())
    }

    async fn exec(&self, command: &EngineCommand) -> Result<(), EngineError> {
        validate_file_name(command.output())?;

        // Decode/encode is CPU bound; keep it off the async workers
        let space = Arc::clone(&self.space);
        let command = command.clone();
        tokio::task::spawn_blocking(move || space.lock().exec(&command))
            .await
            .map_err(|e| EngineError::Failed(format!("Engine task panicked: {}", e)))?
            .map_err(|e| EngineError::Failed(format!("{:#}", e)))
    }
}
