//! Deltascope - watch a source tree and report symbol-level changes.
//!
//! The binary wires the file watcher to a [`ChangeEngine`] and prints every
//! engine event as one JSON line on stdout. Logs go to stderr.
//!
//! # Commands
//!
//! - `deltascope run`: Watch a directory until interrupted
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.
//!
//! [`config`]: deltascope_engine::config

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use deltascope_engine::config::EngineConfig;
use deltascope_engine::types::{EngineEvent, FileEvent};
use deltascope_engine::watcher::FileWatcher;
use deltascope_engine::ChangeEngine;

/// Deltascope - incremental change detection with symbol attribution.
///
/// Watches a directory and reports, for every saved edit, which functions,
/// classes and values it touched.
#[derive(Parser, Debug)]
#[command(name = "deltascope")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DELTASCOPE_ROOT                Directory to watch (default: current directory)
    DELTASCOPE_DEBOUNCE_MS         Quiet period before processing (default: 150)
    DELTASCOPE_DIFF_CACHE_TTL_MS   Diff cache lifetime (default: 2000)
    DELTASCOPE_DIFF_TIMEOUT_MS     Timeout per diff or git call (default: 5000)
    DELTASCOPE_HISTORY_LIMIT       Events kept per file (default: 50)
    DELTASCOPE_IGNORE              Extra comma-separated ignore globs
    DELTASCOPE_VCS_FALLBACK        Consult git for files without a baseline
    DELTASCOPE_LOG_FORMAT          Set to 'json' for JSON logs
    RUST_LOG                       Log filter (default: info)

EXAMPLES:
    # Watch the current directory
    deltascope run

    # Watch another tree, using git for files seen for the first time
    deltascope run --root ../service --vcs-fallback
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and print change events as JSON lines.
    Run {
        /// Directory to watch. Overrides DELTASCOPE_ROOT.
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Ask git for a diff when a file has no baseline yet.
        #[arg(long)]
        vcs_fallback: bool,

        /// Skip baselining existing files at startup.
        #[arg(long)]
        no_scan: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            root,
            vcs_fallback,
            no_scan,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run(root, vcs_fallback, no_scan))
        }
    }
}

async fn run(root: Option<PathBuf>, vcs_fallback: bool, no_scan: bool) -> Result<()> {
    init_logging();

    info!("Starting Deltascope");

    let mut config = EngineConfig::from_env().context("Failed to load configuration")?;
    if let Some(root) = root {
        config.root = root;
    }
    config.vcs_fallback |= vcs_fallback;

    info!(
        root = %config.root.display(),
        debounce_ms = config.debounce.as_millis(),
        vcs_fallback = config.vcs_fallback,
        "Configuration loaded"
    );

    let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(config.channel_capacity);
    let (file_tx, file_rx) = mpsc::channel::<FileEvent>(config.channel_capacity);

    let engine = ChangeEngine::new(config.clone(), event_tx)
        .context("Failed to create change engine")?;

    if !no_scan {
        let count = engine
            .initial_scan()
            .await
            .context("Failed to scan watched directory")?;
        info!(files = count, "Existing files baselined");
    }

    let watcher = FileWatcher::new(config.root.clone(), engine.filter().clone(), file_tx)
        .with_context(|| format!("Failed to watch {}", config.root.display()))?;

    let engine_task = tokio::spawn(engine.clone().run(file_rx));

    info!("Deltascope running. Press Ctrl+C to stop.");

    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            event = event_rx.recv() => {
                let Some(event) = event else {
                    debug!("Engine event channel closed");
                    break;
                };
                if let Err(e) = print_event(&mut stdout, &event) {
                    error!(error = %e, "Failed to write event");
                }
            }
        }
    }

    info!("Shutting down...");
    drop(watcher);
    engine_task.abort();

    info!("Deltascope stopped");
    Ok(())
}

/// Writes one event as a JSON line.
fn print_event(out: &mut impl Write, event: &EngineEvent) -> Result<()> {
    let line = serde_json::to_string(event).context("Failed to serialize event")?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr);

    match std::env::var("DELTASCOPE_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
