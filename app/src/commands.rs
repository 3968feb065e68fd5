//! Command line interface
//!
//! Every invocation restores the session from the data directory, applies
//! `--state` if given, runs one command and exits. Edits are persisted by the
//! session itself.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipcut_types::{OriginMessage, OutboundMessage, SessionSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::asset::AudioAsset;
use crate::config::{load_settings, Settings};
use crate::intake::{AssetSink, IntakeBridge};
use crate::session::share::ShareState;
use crate::session::{SessionController, SessionEvent};
use crate::storage::{BlobStore, FsBlobStore};

/// Directory under the data dir holding the blob store
pub const STORE_DIR: &str = "store";

const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "clipcut", about = "Crop, adjust gain and undo edits on an audio clip", version)]
pub struct Cli {
    /// Data directory (settings, stored session, logs)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Share-state query (`gain`, `regionStart`, `regionEnd`) applied on start
    #[arg(long, global = true)]
    pub state: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load an audio file, replacing the current session
    Load { path: PathBuf },

    /// Show the current session
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Select a region and print the resulting share state
    Region { start: f64, end: f64 },

    /// Drop the selected region and print the resulting share state
    ClearRegion,

    /// Keep only a region (given here or through `--state`)
    Crop {
        #[arg(requires = "end")]
        start: Option<f64>,
        end: Option<f64>,
    },

    /// Apply gain to the whole clip, or to `--start..--end`
    Gain {
        /// Linear gain in [0, 5]; defaults to the pending gain
        value: Option<f64>,
        #[arg(long, requires = "end")]
        start: Option<f64>,
        #[arg(long, requires = "start")]
        end: Option<f64>,
    },

    /// Step back one edit
    Undo,

    /// Set the name used for exports
    Rename { name: String },

    /// Write the current clip as WAV
    Export {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the share-state query
    Share,

    /// Start over: clear the session and stored data
    Reset,

    /// Replay a JSON-lines transcript of posted messages through the intake bridge
    Intake { transcript: PathBuf },
}

/// Run one command against the stored session
pub async fn execute(cli: Cli, data_dir: PathBuf) -> Result<()> {
    let settings = load_settings(&data_dir);
    let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(data_dir.join(STORE_DIR)));
    let session = SessionController::from_settings(&settings, store);
    let events = spawn_event_logger(&session);

    if let Err(e) = session.restore().await {
        tracing::warn!("Could not restore stored session, starting empty: {}", e);
    }
    if let Some(query) = &cli.state {
        session.seed_from_share(ShareState::parse(query));
    }

    let result = run_command(cli.command, &session, &settings).await;

    // Dropping the last controller closes the event stream; let the logger drain it
    drop(session);
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, events).await.is_err() {
        tracing::debug!("Event logger still running at exit");
    }
    result
}

async fn run_command(command: Commands, session: &SessionController, settings: &Settings) -> Result<()> {
    match command {
        Commands::Load { path } => {
            let asset = read_asset(&path).await?;
            session.load_file(asset).await?;
            print_status(&session.snapshot());
        }

        Commands::Status { json } => {
            let snapshot = session.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_status(&snapshot);
            }
        }

        Commands::Region { start, end } => {
            session.set_region(start, end)?;
            println!("{}", session.share_query());
        }

        Commands::ClearRegion => {
            session.clear_region();
            println!("{}", session.share_query());
        }

        Commands::Crop { start, end } => {
            if let (Some(start), Some(end)) = (start, end) {
                session.set_region(start, end)?;
            }
            session.request_crop().await?;
            print_status(&session.snapshot());
        }

        Commands::Gain { value, start, end } => {
            if let Some(value) = value {
                session.set_gain(value)?;
            }
            if let (Some(start), Some(end)) = (start, end) {
                session.set_region(start, end)?;
            }
            session.request_gain_apply().await?;
            print_status(&session.snapshot());
        }

        Commands::Undo => {
            if !session.request_undo().await? {
                println!("Nothing to undo");
            }
            print_status(&session.snapshot());
        }

        Commands::Rename { name } => {
            session.set_display_name(&name).await?;
            print_status(&session.snapshot());
        }

        Commands::Export { out } => {
            let path = session.export(&out).await?;
            println!("{}", path.display());
        }

        Commands::Share => println!("{}", session.share_query()),

        Commands::Reset => {
            session.reset().await?;
            println!("Session cleared");
        }

        Commands::Intake { transcript } => {
            replay_intake(&transcript, session, settings).await?;
            print_status(&session.snapshot());
        }
    }

    Ok(())
}

async fn read_asset(path: &Path) -> Result<AudioAsset> {
    let owned = path.to_path_buf();
    let (bytes, mime) =
        tokio::task::spawn_blocking(move || clipcut_audio::file_io::read_audio_file(owned)).await??;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    Ok(AudioAsset::probed(name, mime, bytes).await)
}

/// Feed each transcript line to a bridge and print its replies as JSON lines
async fn replay_intake(transcript: &Path, session: &SessionController, settings: &Settings) -> Result<()> {
    let file = tokio::fs::File::open(transcript)
        .await
        .with_context(|| format!("Failed to open transcript {:?}", transcript))?;

    let (in_tx, in_rx) = mpsc::channel::<OriginMessage>(16);
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(16);
    let sink: Arc<dyn AssetSink> = Arc::new(session.clone());
    let handle = IntakeBridge::new(settings.allowed_origins.clone(), sink, out_tx).start(in_rx);

    let printer = tokio::spawn(async move {
        while let Some(reply) = out_rx.recv().await {
            match serde_json::to_string(&reply) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode reply: {}", e),
            }
        }
    });

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OriginMessage>(&line) {
            Ok(message) => {
                if in_tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Skipping transcript line {}: {}", line_no, e),
        }
    }

    // Closing the inbound side lets the listener drain and finish
    drop(in_tx);
    handle.join().await;
    let _ = printer.await;
    Ok(())
}

fn spawn_event_logger(session: &SessionController) -> tokio::task::JoinHandle<()> {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(SessionEvent::PersistFailed(message)) => {
                    eprintln!("warning: changes were not saved: {}", message);
                }
                Ok(SessionEvent::EditFailed { kind, message }) => {
                    tracing::debug!("{} failed: {}", kind, message);
                }
                Ok(event) => tracing::trace!("{:?}", event),
                Err(RecvError::Lagged(n)) => tracing::debug!("Event logger skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_status(snapshot: &SessionSnapshot) {
    let Some(asset) = &snapshot.asset else {
        println!("No audio loaded");
        return;
    };

    println!("Name:     {}", snapshot.display_name);
    println!(
        "Asset:    {} ({}, {} bytes{})",
        asset.name,
        asset.mime_type,
        asset.size_bytes,
        asset
            .duration
            .map(|d| format!(", {:.2}s", d))
            .unwrap_or_default()
    );
    println!("Gain:     {} ({})", snapshot.gain, snapshot.gain_label);
    match snapshot.region {
        Some(r) => println!("Region:   {:.2}s - {:.2}s", r.start, r.end),
        None => println!("Region:   none"),
    }
    println!(
        "History:  {}/{}{}",
        snapshot.history_position + 1,
        snapshot.history_len,
        if snapshot.can_undo { " (undo available)" } else { "" }
    );
}
