//! Cross-origin file intake
//!
//! Receives files posted by another window, either whole or in chunks, and
//! hands them to an [`AssetSink`]. Only origins on the allow-list are heard;
//! everything else is dropped without a reply.
//!
//! The bridge is a scoped subscription: [`IntakeBridge::start`] spawns the
//! listener and announces `BRIDGE_READY`, [`IntakeHandle::stop`] ends it.

mod chunks;

pub use chunks::ChunkAssembler;

use async_trait::async_trait;
use clipcut_types::{InboundMessage, OriginMessage, OutboundMessage, SharedAudioData};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::asset::AudioAsset;
use crate::error::IntakeError;

/// Receiver of completed transfers
#[async_trait]
pub trait AssetSink: Send + Sync {
    async fn deliver(&self, asset: AudioAsset) -> Result<(), IntakeError>;
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// Origin not on the allow-list
    Dropped,
    /// A chunk was buffered; the transfer is still incomplete
    Buffered { received: usize, total: u32 },
    /// A file was handed to the sink
    Delivered { filename: String },
}

pub struct IntakeBridge {
    allowed_origins: Vec<String>,
    sink: Arc<dyn AssetSink>,
    outbound: mpsc::Sender<OutboundMessage>,
    chunks: ChunkAssembler,
}

impl IntakeBridge {
    pub fn new(
        allowed_origins: Vec<String>,
        sink: Arc<dyn AssetSink>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            allowed_origins,
            sink,
            outbound,
            chunks: ChunkAssembler::new(),
        }
    }

    /// Exact match against the allow-list
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    async fn post(&self, message: OutboundMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!("Outbound channel closed; reply dropped");
        }
    }

    /// Process one message
    pub async fn handle(&mut self, message: OriginMessage) -> Result<IntakeOutcome, IntakeError> {
        if !self.is_allowed(&message.origin) {
            tracing::debug!("Ignoring message from untrusted origin {}", message.origin);
            return Ok(IntakeOutcome::Dropped);
        }

        match message.data {
            InboundMessage::SaveAudioData { message_id, data } => {
                tracing::info!("SAVE_AUDIO_DATA {} ({})", message_id, data.filename);
                let result = self.deliver(data).await;
                let reply = match &result {
                    Ok(_) => OutboundMessage::AudioDataSaved { message_id },
                    Err(e) => OutboundMessage::AudioDataError {
                        message_id,
                        error: e.to_string(),
                    },
                };
                self.post(reply).await;
                result
            }

            InboundMessage::SharedAudioFile {
                filename,
                file_type,
                array_buffer,
            } => {
                tracing::info!("SHARED_AUDIO_FILE {} ({} bytes)", filename, array_buffer.len());
                self.deliver(SharedAudioData {
                    filename,
                    file_type,
                    array_buffer,
                })
                .await
            }

            InboundMessage::SharedAudioChunk {
                chunk_index,
                total_chunks,
                chunk,
                filename,
                file_type,
            } => {
                let complete =
                    self.chunks
                        .push(chunk_index, total_chunks, chunk, &filename, &file_type);
                match complete {
                    Ok(Some(data)) => self.deliver(data).await,
                    Ok(None) => {
                        let (received, total) =
                            self.chunks.progress().unwrap_or((0, total_chunks));
                        Ok(IntakeOutcome::Buffered { received, total })
                    }
                    Err(e) => {
                        tracing::warn!("Chunked transfer of {} failed: {}", filename, e);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn deliver(&self, data: SharedAudioData) -> Result<IntakeOutcome, IntakeError> {
        if data.array_buffer.is_empty() {
            return Err(IntakeError::EmptyPayload(data.filename));
        }
        let filename = data.filename.clone();
        let asset = AudioAsset::probed(data.filename, data.file_type, data.array_buffer).await;
        self.sink.deliver(asset).await?;
        Ok(IntakeOutcome::Delivered { filename })
    }

    /// Announce readiness and listen until stopped or the inbound stream ends
    pub fn start(mut self, mut inbound: mpsc::Receiver<OriginMessage>) -> IntakeHandle {
        let token = CancellationToken::new();
        let cancel = token.clone();

        let task = tokio::spawn(async move {
            self.post(OutboundMessage::BridgeReady).await;
            tracing::info!("Intake bridge listening ({} allowed origins)", self.allowed_origins.len());

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = inbound.recv() => {
                        let Some(message) = message else { break };
                        if let Err(e) = self.handle(message).await {
                            tracing::warn!("Intake failed: {}", e);
                        }
                    }
                }
            }

            self.chunks.clear();
            tracing::info!("Intake bridge stopped");
        });

        IntakeHandle { token, task }
    }
}

/// Running bridge listener
pub struct IntakeHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl IntakeHandle {
    /// Stop listening and wait for the listener to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Intake listener panicked: {}", e);
        }
    }

    /// Wait for the inbound stream to end on its own
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Intake listener panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const ORIGIN: &str = "https://directpodcast.fr";

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<AudioAsset>>,
    }

    #[async_trait]
    impl AssetSink for RecordingSink {
        async fn deliver(&self, asset: AudioAsset) -> Result<(), IntakeError> {
            if !asset.is_audio() {
                return Err(IntakeError::Rejected {
                    filename: asset.name().to_string(),
                    reason: "not audio".into(),
                });
            }
            self.received.lock().push(asset);
            Ok(())
        }
    }

    fn bridge() -> (IntakeBridge, Arc<RecordingSink>, mpsc::Receiver<OutboundMessage>) {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let bridge = IntakeBridge::new(vec![ORIGIN.to_string()], sink.clone(), tx);
        (bridge, sink, rx)
    }

    fn save(origin: &str, id: &str, file_type: &str, bytes: &[u8]) -> OriginMessage {
        OriginMessage {
            origin: origin.to_string(),
            data: InboundMessage::SaveAudioData {
                message_id: id.to_string(),
                data: SharedAudioData {
                    filename: "take.wav".into(),
                    file_type: file_type.into(),
                    array_buffer: bytes.to_vec(),
                },
            },
        }
    }

    #[tokio::test]
    async fn test_save_is_acknowledged() {
        let (mut bridge, sink, mut rx) = bridge();
        let outcome = bridge.handle(save(ORIGIN, "m1", "audio/wav", b"RIFF")).await.unwrap();
        assert_eq!(
            outcome,
            IntakeOutcome::Delivered {
                filename: "take.wav".into()
            }
        );
        assert_eq!(sink.received.lock().len(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundMessage::AudioDataSaved {
                message_id: "m1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_save_reports_error() {
        let (mut bridge, sink, mut rx) = bridge();
        assert!(bridge.handle(save(ORIGIN, "m2", "text/plain", b"x")).await.is_err());
        assert!(sink.received.lock().is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundMessage::AudioDataError { message_id, .. } if message_id == "m2"
        ));
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_silent() {
        let (mut bridge, sink, mut rx) = bridge();
        let outcome = bridge
            .handle(save("https://evil.example", "m3", "audio/wav", b"RIFF"))
            .await
            .unwrap();
        assert_eq!(outcome, IntakeOutcome::Dropped);
        assert!(sink.received.lock().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_origin_must_match_exactly() {
        let (bridge, _, _) = bridge();
        assert!(bridge.is_allowed(ORIGIN));
        assert!(!bridge.is_allowed("https://directpodcast.fr/"));
        assert!(!bridge.is_allowed("http://directpodcast.fr"));
    }

    #[tokio::test]
    async fn test_chunked_transfer() {
        let (mut bridge, sink, _rx) = bridge();
        let chunk = |i: u32, bytes: &[u8]| OriginMessage {
            origin: ORIGIN.into(),
            data: InboundMessage::SharedAudioChunk {
                chunk_index: i,
                total_chunks: 2,
                chunk: bytes.to_vec(),
                filename: "big.wav".into(),
                file_type: "audio/wav".into(),
            },
        };

        assert_eq!(
            bridge.handle(chunk(1, b"-two")).await.unwrap(),
            IntakeOutcome::Buffered { received: 1, total: 2 }
        );
        bridge.handle(chunk(0, b"one")).await.unwrap();

        let received = sink.received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].bytes(), b"one-two");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (bridge, sink, mut out) = bridge();
        let (tx, rx) = mpsc::channel(4);
        let handle = bridge.start(rx);

        assert_eq!(out.recv().await.unwrap(), OutboundMessage::BridgeReady);
        tx.send(save(ORIGIN, "m4", "audio/wav", b"RIFF")).await.unwrap();
        assert!(matches!(
            out.recv().await.unwrap(),
            OutboundMessage::AudioDataSaved { .. }
        ));

        handle.stop().await;
        assert_eq!(sink.received.lock().len(), 1);
        // Listener is gone; the inbound side sees a closed channel
        assert!(tx.send(save(ORIGIN, "m5", "audio/wav", b"RIFF")).await.is_err());
    }
}
