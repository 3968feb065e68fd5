//! Worker process management
//!
//! Runs engine commands in a separate `clipcut-worker` process. A decoder
//! that crashes or leaks only takes the worker with it; the manager restarts
//! it between cycles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clipcut_types::{EngineCommand, WorkerCommand, WorkerResponse};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use crate::transcode::{validate_file_name, EngineError, TranscodeEngine};

/// File name of the worker binary
pub const WORKER_BINARY: &str = if cfg!(windows) {
    "clipcut-worker.exe"
} else {
    "clipcut-worker"
};

/// Default number of requests before a restart
pub const DEFAULT_RESTART_AFTER: u32 = 200;

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Worker process manager
pub struct WorkerManager {
    /// Path to worker binary
    worker_path: PathBuf,
    /// Current worker process
    worker: Option<WorkerProcess>,
    /// Number of requests since last restart
    request_count: u32,
    /// Max requests before a restart
    max_requests: u32,
}

impl WorkerManager {
    pub fn new(worker_path: impl Into<PathBuf>, max_requests: u32) -> Self {
        Self {
            worker_path: worker_path.into(),
            worker: None,
            request_count: 0,
            max_requests: max_requests.max(1),
        }
    }

    /// Locate the worker binary next to the running executable
    pub fn default_path() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        let path = exe.parent()?.join(WORKER_BINARY);
        path.exists().then_some(path)
    }

    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start the worker process
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        tracing::info!("Starting worker process: {:?}", self.worker_path);

        let mut child = Command::new(&self.worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn worker {:?}", self.worker_path))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Worker stdin not available"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Worker stdout not available"))?;

        self.worker = Some(WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        self.request_count = 0;

        Ok(())
    }

    /// Stop the worker process
    pub fn stop(&mut self) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            tracing::info!("Stopping worker process");
            // Polite shutdown first; kill if the pipe is already gone
            let polite = serde_json::to_string(&WorkerCommand::Shutdown)
                .map_err(anyhow::Error::from)
                .and_then(|line| {
                    writeln!(worker.stdin, "{}", line)?;
                    worker.stdin.flush()?;
                    Ok(())
                });
            if polite.is_err() {
                worker.child.kill()?;
            }
            worker.child.wait()?;
        }
        Ok(())
    }

    /// Restart the worker process
    pub fn restart(&mut self) -> Result<()> {
        tracing::info!(
            "Restarting worker process (request_count={})",
            self.request_count
        );
        self.stop()?;
        self.start()
    }

    pub fn needs_restart(&self) -> bool {
        self.request_count >= self.max_requests
    }

    /// Send a command to the worker and wait for its response
    pub fn send_command(&mut self, command: &WorkerCommand) -> Result<WorkerResponse> {
        if self.worker.is_none() {
            self.start()?;
        }

        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Worker not running"))?;

        let cmd_json = serde_json::to_string(command)?;
        let sent = writeln!(worker.stdin, "{}", cmd_json).and_then(|_| worker.stdin.flush());

        let mut line = String::new();
        let read = sent.and_then(|_| worker.stdout.read_line(&mut line));

        self.request_count += 1;

        match read {
            Ok(0) | Err(_) => {
                // The process is gone; drop it so the next call starts fresh
                if let Some(mut dead) = self.worker.take() {
                    if let Err(e) = dead.child.kill() {
                        tracing::debug!("Failed to kill dead worker: {}", e);
                    }
                    match dead.child.wait() {
                        Ok(status) => tracing::debug!("Dead worker reaped: {}", status),
                        Err(e) => tracing::debug!("Failed to reap dead worker: {}", e),
                    }
                }
                anyhow::bail!("Worker process exited unexpectedly");
            }
            Ok(_) => {}
        }

        let response: WorkerResponse =
            serde_json::from_str(&line).context("Malformed worker response")?;
        Ok(response)
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Error stopping worker: {}", e);
        }
    }
}

/// Transcode engine backed by a worker process
#[derive(Clone)]
pub struct WorkerEngine {
    manager: Arc<Mutex<WorkerManager>>,
}

impl WorkerEngine {
    /// Spawn the worker; blocks while the process starts
    pub fn start(worker_path: Option<PathBuf>, restart_after: u32) -> Result<Self, EngineError> {
        let path = worker_path
            .or_else(WorkerManager::default_path)
            .ok_or_else(|| {
                EngineError::Unavailable(format!("{} not found next to executable", WORKER_BINARY))
            })?;

        let mut manager = WorkerManager::new(path, restart_after);
        manager
            .start()
            .map_err(|e| EngineError::Unavailable(format!("{:#}", e)))?;

        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    async fn call(&self, command: WorkerCommand) -> Result<WorkerResponse, EngineError> {
        let manager = Arc::clone(&self.manager);
        let response = tokio::task::spawn_blocking(move || manager.lock().send_command(&command))
            .await
            .map_err(|e| EngineError::Failed(format!("Worker task panicked: {}", e)))?
            .map_err(|e| EngineError::Unavailable(format!("{:#}", e)))?;

        match response {
            WorkerResponse::Error { message } => Err(EngineError::Failed(message)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl TranscodeEngine for WorkerEngine {
    fn name(&self) -> &str {
        "worker"
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), EngineError> {
        validate_file_name(name)?;
        self.call(WorkerCommand::WriteFile {
            name: name.to_string(),
            data,
        })
        .await
        .map(|_| ())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        match self
            .call(WorkerCommand::ReadFile {
                name: name.to_string(),
            })
            .await
        {
            Ok(WorkerResponse::File { data, .. }) => Ok(data),
            Ok(_) => Err(EngineError::failed("Unexpected worker response")),
            Err(EngineError::Failed(message)) if message.starts_with("No such file") => {
                Err(EngineError::NotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.call(WorkerCommand::DeleteFile {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn exec(&self, command: &EngineCommand) -> Result<(), EngineError> {
        validate_file_name(command.output())?;
        self.call(WorkerCommand::Exec {
            command: command.clone(),
        })
        .await
        .map(|_| ())
    }

    /// Restart only between cycles so no scratch file is lost mid-operation
    async fn recycle(&self) -> Result<(), EngineError> {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || {
            let mut manager = manager.lock();
            if manager.needs_restart() || !manager.is_running() {
                manager.restart()
            } else {
                Ok(())
            }
        })
        .await
        .map_err(|e| EngineError::Failed(format!("Worker task panicked: {}", e)))?
        .map_err(|e| EngineError::Unavailable(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let result = WorkerEngine::start(Some(PathBuf::from("/nonexistent/clipcut-worker")), 10);
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
    }

    #[test]
    fn test_restart_threshold() {
        let manager = WorkerManager::new("clipcut-worker", 0);
        // A zero threshold is raised to one request
        assert!(!manager.needs_restart());
        assert!(!manager.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_worker_is_dropped() {
        // `true` exits at once without answering
        let mut manager = WorkerManager::new("true", 10);
        manager.start().unwrap();
        assert!(manager.is_running());

        let err = manager.send_command(&WorkerCommand::Shutdown).unwrap_err();
        assert!(err.to_string().contains("exited unexpectedly"));
        assert!(!manager.is_running());
    }

    #[tokio::test]
    #[ignore = "Requires a built clipcut-worker binary"]
    async fn test_worker_engine_cycle() {
        use clipcut_audio::PcmAudio;

        let engine = WorkerEngine::start(None, 3).expect("worker binary not found");
        let input = clipcut_audio::encode_wav16(&PcmAudio::silence(1.0, 8000, 1)).unwrap();

        engine.write_file("in.wav", input).await.unwrap();
        engine
            .exec(&EngineCommand::Volume {
                input: "in.wav".into(),
                output: "out.wav".into(),
                gain: 0.5,
            })
            .await
            .unwrap();
        let out = engine.read_file("out.wav").await.unwrap();
        assert!(!out.is_empty());
        assert!(matches!(
            engine.read_file("missing.wav").await,
            Err(EngineError::NotFound(_))
        ));

        // Three requests or more: the next cycle restarts the process
        engine.recycle().await.unwrap();
        assert!(matches!(
            engine.read_file("out.wav").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
