//! CCM - list, watch and jump to running Claude Code sessions
//!
//! Each invocation runs its own registry; no daemon is required.
//!
//! # Usage
//!
//! ```text
//! ccm                # Same as `ccm list`
//! ccm list --json    # One poll cycle, printed as JSON
//! ccm watch          # Print the session list whenever it changes
//! ccm focus 4242     # Bring the terminal running PID 4242 forward
//! ccm new            # Open a new terminal running claude
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ccm_core::{SessionSnapshot, SessionStatus};
use ccmd::automation::SessionCommands;
use ccmd::config::MonitorConfig;
use ccmd::registry::{spawn_registry, Poller, RegistryHandle};

// ============================================================================
// CLI Arguments
// ============================================================================

/// CCM - Claude Code session monitor
#[derive(Parser, Debug)]
#[command(name = "ccm")]
#[command(about = "Monitor running Claude Code sessions")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll once and print the sessions
    List {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the sessions every time the list changes
    Watch,
    /// Bring the terminal hosting a session to the front
    Focus {
        /// Process ID of the session
        pid: u32,
    },
    /// Open a new terminal running the assistant
    New,
}

// ============================================================================
// Output
// ============================================================================

fn print_snapshot(snapshot: &SessionSnapshot) {
    if snapshot.is_empty() {
        println!("No Claude Code sessions running.");
        return;
    }

    for session in &snapshot.sessions {
        println!(
            "{} {:>7}  {:<10} {:<12} {}",
            session.status.icon(),
            session.pid,
            session.tty,
            session.status.label(),
            session.title
        );
    }

    let noun = if snapshot.len() == 1 { "session" } else { "sessions" };
    if snapshot.waiting_count > 0 {
        println!(
            "\n{} {noun}, {} {}",
            snapshot.len(),
            snapshot.waiting_count,
            SessionStatus::Waiting.label().to_lowercase()
        );
    } else {
        println!("\n{} {noun}", snapshot.len());
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn poll_once(registry: &RegistryHandle) -> Result<Arc<SessionSnapshot>> {
    registry
        .refresh_and_wait()
        .await
        .context("Session registry stopped before polling")
}

async fn run_list(registry: &RegistryHandle, json: bool) -> Result<()> {
    let snapshot = poll_once(registry).await?;
    if json {
        let out = serde_json::to_string_pretty(&*snapshot).context("Failed to encode snapshot")?;
        println!("{out}");
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

async fn run_watch(registry: &RegistryHandle, cancel: &CancellationToken) -> Result<()> {
    let mut snapshots = registry.subscribe();
    let mut last: Option<Arc<SessionSnapshot>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    bail!("Session registry stopped");
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if last.as_ref().is_some_and(|prev| prev.same_sessions(&snapshot)) {
                    debug!("Snapshot unchanged");
                    continue;
                }
                println!("--- {} ---", snapshot.polled_at.with_timezone(&chrono::Local).format("%H:%M:%S"));
                print_snapshot(&snapshot);
                last = Some(snapshot);
            }
        }
    }

    Ok(())
}

async fn run_focus(registry: &RegistryHandle, commands: &SessionCommands, pid: u32) -> Result<()> {
    let snapshot = poll_once(registry).await?;
    let Some(session) = snapshot.get(pid) else {
        bail!("No Claude Code session with PID {pid}");
    };

    info!(pid, tty = %session.tty, "Focusing session");
    commands
        .focus_session(session)
        .await
        .context("Focus task failed")?;
    Ok(())
}

async fn run_new(commands: &SessionCommands) -> Result<()> {
    commands
        .open_new_session()
        .await
        .context("Open task failed")?;
    Ok(())
}

fn start_registry(config: &MonitorConfig, cancel: &CancellationToken) -> RegistryHandle {
    spawn_registry(Poller::from_config(config), cancel.clone())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ccmd=warn".parse()?)
                .add_directive("ccm_core=warn".parse()?),
        )
        .init();

    let config = MonitorConfig::load().context("Failed to load configuration")?;
    let command = args.command.unwrap_or(Command::List { json: false });

    let cancel = CancellationToken::new();
    let commands = SessionCommands::from_config(&config);

    let result = match command {
        Command::List { json } => run_list(&start_registry(&config, &cancel), json).await,
        Command::Watch => {
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                ctrl_c.cancel();
            });
            run_watch(&start_registry(&config, &cancel), &cancel).await
        }
        Command::Focus { pid } => {
            run_focus(&start_registry(&config, &cancel), &commands, pid).await
        }
        Command::New => run_new(&commands).await,
    };

    cancel.cancel();
    result
}
