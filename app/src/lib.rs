//! clipcut library
//!
//! Core of the clipcut audio clip editor: an editing session that tracks an
//! audio asset through crop and gain edits with bounded undo, persisted
//! snapshots and a cross-origin file intake.

pub mod asset;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod intake;
pub mod region;
pub mod session;
pub mod storage;
pub mod transcode;
pub mod workers;

pub use asset::AudioAsset;
pub use error::{EditorError, Result};
pub use session::{SessionController, SessionEvent};

use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log to stderr and to a daily rolling file under `log_dir`.
///
/// stdout stays free for command output. Keep the guard alive until exit or
/// buffered file lines are lost.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "clipcut.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,clipcut=debug,clipcut_lib=debug".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    guard
}

/// Parse the command line and run it
pub fn run() -> anyhow::Result<()> {
    let cli = commands::Cli::parse();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(config::default_data_dir);

    let _guard = init_logging(&data_dir.join("logs"));
    tracing::info!("Starting clipcut {}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::execute(cli, data_dir))
}
