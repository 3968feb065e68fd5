//! clipcut transcode worker
//!
//! Runs engine commands against an in-memory file space in a separate
//! process, so a crashing or leaking decoder cannot take the editor down.
//!
//! Communication is JSON lines over stdin/stdout.

use anyhow::Result;
use clipcut_audio::ScratchSpace;
use clipcut_types::{WorkerCommand, WorkerResponse};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // stdout is for IPC
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("clipcut worker starting");

    if let Err(e) = run_worker() {
        tracing::error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

fn run_worker() -> Result<()> {
    let mut space = ScratchSpace::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    tracing::info!("Worker ready, listening for commands");

    for line in stdin.lock().lines() {
        let line = line?;

        if line.is_empty() {
            continue;
        }

        let command: WorkerCommand = match serde_json::from_str(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                let response = WorkerResponse::Error {
                    message: format!("Invalid command: {}", e),
                };
                writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let shutdown = matches!(command, WorkerCommand::Shutdown);
        let response = handle(&mut space, command);

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;

        if shutdown {
            break;
        }
    }

    tracing::info!("Worker shutting down ({} files left)", space.len());
    Ok(())
}

fn handle(space: &mut ScratchSpace, command: WorkerCommand) -> WorkerResponse {
    match command {
        WorkerCommand::WriteFile { name, data } => {
            tracing::debug!("write {} ({} bytes)", name, data.len());
            space.write_file(&name, data);
            WorkerResponse::Ok
        }

        WorkerCommand::ReadFile { name } => match space.read_file(&name) {
            Some(data) => WorkerResponse::File {
                data: data.to_vec(),
                name,
            },
            None => WorkerResponse::Error {
                message: format!("No such file: {}", name),
            },
        },

        WorkerCommand::DeleteFile { name } => {
            space.delete_file(&name);
            WorkerResponse::Ok
        }

        WorkerCommand::Exec { command } => {
            tracing::debug!("exec {:?}", command);
            match space.exec(&command) {
                Ok(()) => WorkerResponse::Ok,
                Err(e) => WorkerResponse::Error {
                    message: format!("{:#}", e),
                },
            }
        }

        WorkerCommand::Shutdown => {
            tracing::info!("Shutdown command received");
            WorkerResponse::Ok
        }
    }
}
