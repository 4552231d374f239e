//! Session registry using Actor pattern.
//!
//! The registry owns the poller and is the single source of truth for the
//! session list. It receives commands via a tokio mpsc channel and publishes
//! each snapshot through a watch channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Poll Timer    │────▶│  RegistryActor  │────▶│  Watch Channel  │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │  spawn_blocking       │  Arc<SessionSnapshot>
//!         │   (mpsc channel)      │  Poller::poll()       │  (latest only)
//!         ▼                       ▼                       ▼
//!    Refresh every 5s        Enumerate, correlate,   Handles read the last
//!    (and on request)        classify, prune, sort   published snapshot
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use ccm_core::SessionSnapshot;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod actor;
mod commands;
mod handle;
mod poller;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use poller::Poller;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 32;

/// Time between scheduled poll cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command and snapshot channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns the poll timer, whose first tick fires immediately
/// 4. Returns a RegistryHandle for client use
///
/// Cancelling `cancel` stops both tasks.
///
/// # Example
///
/// ```no_run
/// use ccmd::config::MonitorConfig;
/// use ccmd::registry::{spawn_registry, Poller};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let poller = Poller::from_config(&MonitorConfig::default());
///     let handle = spawn_registry(poller, CancellationToken::new());
///
///     let snapshot = handle.refresh_and_wait().await;
/// }
/// ```
pub fn spawn_registry(poller: Poller, cancel: CancellationToken) -> RegistryHandle {
    spawn_registry_with_interval(poller, POLL_INTERVAL, cancel)
}

/// Like [`spawn_registry`], with a custom poll period.
pub fn spawn_registry_with_interval(
    poller: Poller,
    period: Duration,
    cancel: CancellationToken,
) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (publisher, snapshots) = watch::channel(Arc::new(SessionSnapshot::empty()));

    let actor = RegistryActor::new(cmd_rx, poller, publisher, period, cancel.clone());
    tokio::spawn(actor.run());

    spawn_poll_timer(cmd_tx.clone(), period, cancel);

    RegistryHandle::new(cmd_tx, snapshots)
}

/// Spawn a background task that triggers a poll cycle every `period`.
fn spawn_poll_timer(sender: mpsc::Sender<RegistryCommand>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // A slow cycle delays the next tick instead of causing a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Poll timer stopping: cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // Fire-and-forget refresh command
            if sender.send(RegistryCommand::refresh()).await.is_err() {
                debug!("Poll timer stopping: registry channel closed");
                break;
            }
        }
    });
}
