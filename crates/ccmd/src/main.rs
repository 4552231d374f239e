//! CCM Daemon - background Claude Code session monitor
//!
//! Polls the process table every five seconds and logs each change in the
//! session list.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! ccmd start
//!
//! # Start the daemon (background/daemonized)
//! ccmd start -d
//!
//! # Stop the daemon
//! ccmd stop
//!
//! # Check daemon status
//! ccmd status
//!
//! # Watch a different log tree
//! CCM_LOG_ROOT=/tmp/projects ccmd start
//!
//! # Enable debug logging
//! RUST_LOG=ccmd=debug ccmd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daemonize::Daemonize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ccm_core::SessionSnapshot;
use ccmd::config::MonitorConfig;
use ccmd::daemon::{send_terminate, wait_for_exit, DaemonFiles};
use ccmd::registry::{spawn_registry, Poller};

/// CCM daemon - Claude Code session monitor
#[derive(Parser, Debug)]
#[command(name = "ccmd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// How long `ccmd stop` waits for the daemon to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let args = Args::parse();
    let files = DaemonFiles::from_state_dir();

    match args.command.unwrap_or(Command::Start { daemon: false }) {
        Command::Start { daemon } => start(&files, daemon),
        Command::Stop => stop(&files),
        Command::Status => status(&files),
    }
}

fn start(files: &DaemonFiles, detach: bool) -> Result<()> {
    if let Some(pid) = files.running_pid() {
        eprintln!("Daemon is already running (PID {pid})");
        eprintln!("Use 'ccmd stop' to stop it first.");
        process::exit(1);
    }

    // Load before forking so config errors reach the terminal
    let config = MonitorConfig::load().context("Failed to load configuration")?;

    if detach {
        // Must happen before the tokio runtime starts
        let (stdout, stderr) = files.open_log()?;
        Daemonize::new()
            .working_directory("/")
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .context("Failed to daemonize")?;
    }

    files.write_pid(process::id())?;
    let result = run_daemon(config);
    files.remove_pid();
    result
}

fn stop(files: &DaemonFiles) -> Result<()> {
    let Some(pid) = files.running_pid() else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID {pid})...");
    send_terminate(pid)?;

    if wait_for_exit(pid, STOP_TIMEOUT) {
        println!("Daemon stopped.");
        Ok(())
    } else {
        bail!("Daemon did not stop within {} seconds", STOP_TIMEOUT.as_secs());
    }
}

fn status(files: &DaemonFiles) -> Result<()> {
    match files.running_pid() {
        Some(pid) => {
            println!("Daemon is running (PID {pid})");
            println!("Log: {}", files.log_file().display());
            Ok(())
        }
        None => {
            println!("Daemon is not running.");
            process::exit(1);
        }
    }
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: MonitorConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ccmd=info".parse()?)
                .add_directive("ccm_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        executable = %config.executable_name,
        log_root = %config.log_root.display(),
        "CCM daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(Poller::from_config(&config), cancel_token.clone());
    info!("Session registry started");

    let mut snapshots = registry.subscribe();
    let mut last = Arc::new(SessionSnapshot::empty());
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    error!("Registry stopped unexpectedly");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.same_sessions(&last) {
                    continue;
                }
                for session in &snapshot.sessions {
                    info!(
                        pid = session.pid,
                        tty = %session.tty,
                        status = %session.status,
                        title = %session.title,
                        "Session"
                    );
                }
                info!(
                    sessions = snapshot.len(),
                    waiting = snapshot.waiting_count,
                    "Session list changed"
                );
                last = snapshot;
            }
        }
    }

    cancel_token.cancel();
    info!("CCM daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
