//! ingest-uploader - command-line upload client
//!
//! Queues the given PDF/ZIP files, submits them as one batch and follows
//! per-file progress until the session finishes. Ctrl+C requests a
//! server-side cancel; a second Ctrl+C stops tracking immediately.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ingest_common::events::{EventBus, IngestEvent, LogSeverity, SessionState};
use ingest_common::human_size::format_bytes;
use ingest_uploader::backend::HttpBackend;
use ingest_uploader::config::{ConfigOverrides, UploaderConfig, EVENT_BUS_CAPACITY};
use ingest_uploader::models::FileHandle;
use ingest_uploader::stats::summary_line;
use ingest_uploader::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the event stream before submitting anyway
const STREAM_CONNECT_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ingest-uploader")]
#[command(about = "Upload invoice PDFs and ZIP archives to the ingestion backend")]
#[command(version)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://localhost:5000/api
    #[arg(short, long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload files and follow their processing
    Upload {
        /// PDF or ZIP files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Reject files larger than this many bytes
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Maximum number of queued files
        #[arg(long)]
        max_queue_len: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = ingest_common::config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Upload {
            paths,
            max_file_size,
            max_queue_len,
        } => {
            let config = UploaderConfig::from_toml(&toml_config).with_overrides(ConfigOverrides {
                backend_url: cli.backend_url,
                max_file_size_bytes: max_file_size,
                max_queue_len,
            });
            config.validate().context("Invalid configuration")?;
            upload(config, paths).await
        }
    }
}

async fn upload(config: UploaderConfig, paths: Vec<PathBuf>) -> Result<()> {
    info!("Backend: {}", config.backend_url);

    let backend = Arc::new(
        HttpBackend::new(&config.backend_url, config.request_timeout)
            .context("Failed to create backend client")?,
    );
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let mut events = event_bus.subscribe();
    let shutdown = CancellationToken::new();
    let (handle, task) = Orchestrator::spawn(&config, backend, event_bus, shutdown.clone());

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match FileHandle::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => eprintln!("Skipping {}: {}", path.display(), e),
        }
    }
    let report = handle.enqueue(files).await?;
    for rejection in &report.rejected {
        eprintln!("Rejected: {}", rejection);
    }
    if report.accepted.is_empty() {
        shutdown.cancel();
        let _ = task.await;
        anyhow::bail!("No files to upload");
    }

    wait_for_stream(&mut events).await;
    handle.submit().await?;

    let mut interrupts = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                interrupts += 1;
                if interrupts == 1 {
                    eprintln!("Cancelling upload (press Ctrl+C again to stop waiting)");
                    if let Err(e) = handle.cancel().await {
                        warn!("Cancel not possible: {}", e);
                        let _ = handle.force_stop().await;
                    }
                } else {
                    let _ = handle.force_stop().await;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if print_event(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} progress events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    let snapshot = handle.snapshot().await?;
    println!();
    for file in &snapshot.files {
        let detail = file
            .error_detail
            .as_deref()
            .or(file.duplicate_reason.as_deref())
            .unwrap_or(&file.message);
        println!(
            "{:<14} {:>9}  {}  {}",
            file.state.as_str(),
            format_bytes(file.size_bytes),
            file.name,
            detail
        );
    }
    println!("{}", summary_line(&snapshot.stats));

    shutdown.cancel();
    let _ = task.await;

    if snapshot.session.state == SessionState::Completed {
        Ok(())
    } else {
        anyhow::bail!("Upload session ended {}", snapshot.session.state)
    }
}

/// Give the event stream a moment to connect so no progress is missed
async fn wait_for_stream(events: &mut broadcast::Receiver<IngestEvent>) {
    let connected = tokio::time::timeout(STREAM_CONNECT_GRACE, async {
        loop {
            match events.recv().await {
                Ok(IngestEvent::StreamStatus { connected: true, .. }) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;

    if connected.is_err() {
        warn!("Event stream not connected yet, submitting anyway");
    }
}

/// Print one event; returns true once the session is over
fn print_event(event: &IngestEvent) -> bool {
    match event {
        IngestEvent::LogAppended {
            severity, message, ..
        } => {
            let marker = match severity {
                LogSeverity::Info => " ",
                LogSeverity::Success => "+",
                LogSeverity::Warning => "!",
                LogSeverity::Error => "x",
                LogSeverity::Duplicate => "=",
            };
            println!("{} {}", marker, message);
            false
        }
        IngestEvent::Notification { message, .. } => {
            eprintln!("{}", message);
            false
        }
        IngestEvent::SessionChanged { new_state, .. } => {
            new_state.is_terminal() || *new_state == SessionState::Idle
        }
        _ => false,
    }
}
