//! Registry actor - owns the poller and publishes snapshots.
//!
//! The RegistryActor is the single owner of session state in the system.
//! It receives commands via an mpsc channel and publishes each snapshot
//! through a watch channel.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poll cycle that panics on its blocking thread stops the actor;
//!   handles then report `RegistryError::ChannelClosed`

use std::sync::Arc;
use std::time::{Duration, Instant};

use ccm_core::SessionSnapshot;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::commands::RegistryCommand;
use super::poller::Poller;

type Responder = oneshot::Sender<Arc<SessionSnapshot>>;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns the poller and its caches.
///
/// Commands are processed sequentially, so poll cycles never overlap. Any
/// `Refresh` commands that queue up while a cycle runs are folded into the
/// next single cycle, and every waiter receives that cycle's snapshot.
///
/// # Ownership
///
/// The poller is moved onto a blocking thread for the duration of a cycle
/// and moved back afterwards. Consumers only ever see immutable
/// `Arc<SessionSnapshot>` values.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// `None` only while a cycle is running, or after one panicked
    poller: Option<Poller>,

    /// Latest snapshot for subscribers
    publisher: watch::Sender<Arc<SessionSnapshot>>,

    /// Nominal poll period; cycles longer than this are reported
    period: Duration,

    /// Stops the actor when cancelled
    cancel: CancellationToken,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        poller: Poller,
        publisher: watch::Sender<Arc<SessionSnapshot>>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            poller: Some(poller),
            publisher,
            period,
            cancel,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes, the token is cancelled,
    /// or a poll cycle panics.
    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs_f64(), "Registry actor starting");

        loop {
            let cmd = tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            let mut waiters = Vec::new();
            Self::collect(cmd, &mut waiters);

            let mut coalesced = 0usize;
            while let Ok(cmd) = self.receiver.try_recv() {
                Self::collect(cmd, &mut waiters);
                coalesced += 1;
            }
            if coalesced > 0 {
                debug!(coalesced, "Coalesced queued refresh commands");
            }

            let Some(snapshot) = self.run_cycle().await else {
                break;
            };

            for waiter in waiters {
                // Ignore send error - caller may have dropped the receiver
                let _ = waiter.send(Arc::clone(&snapshot));
            }
        }

        info!("Registry actor stopped");
    }

    fn collect(cmd: RegistryCommand, waiters: &mut Vec<Responder>) {
        match cmd {
            RegistryCommand::Refresh { respond_to } => {
                if let Some(tx) = respond_to {
                    waiters.push(tx);
                }
            }
        }
    }

    /// Runs one poll cycle on a blocking thread and publishes the result.
    ///
    /// Returns `None` if the poller is gone.
    async fn run_cycle(&mut self) -> Option<Arc<SessionSnapshot>> {
        let mut poller = self.poller.take()?;
        let started = Instant::now();

        let joined = tokio::task::spawn_blocking(move || {
            let snapshot = poller.poll();
            (poller, snapshot)
        })
        .await;

        let (poller, snapshot) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Poll cycle failed, registry stopping");
                return None;
            }
        };
        self.poller = Some(poller);

        let elapsed = started.elapsed();
        if elapsed > self.period {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                "Poll cycle took longer than the poll period"
            );
        }

        Some(self.publish(snapshot))
    }

    /// Replaces the published snapshot in one step.
    fn publish(&self, snapshot: SessionSnapshot) -> Arc<SessionSnapshot> {
        let changed = !self.publisher.borrow().same_sessions(&snapshot);
        let snapshot = Arc::new(snapshot);
        self.publisher.send_replace(Arc::clone(&snapshot));

        if changed {
            info!(
                sessions = snapshot.len(),
                waiting = snapshot.waiting_count,
                "Sessions changed"
            );
        } else {
            debug!(sessions = snapshot.len(), "Sessions unchanged");
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ccm_core::ProcessDetail;
    use tempfile::TempDir;

    use crate::correlator::Correlator;
    use crate::locator::LogLocator;
    use crate::process::{ProcessError, ProcessSource};

    struct CountingSource {
        details: HashMap<u32, ProcessDetail>,
        polls: Arc<AtomicUsize>,
    }

    impl ProcessSource for CountingSource {
        fn list_pids(&self) -> Result<Vec<u32>, ProcessError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut pids: Vec<u32> = self.details.keys().copied().collect();
            pids.sort_unstable();
            Ok(pids)
        }

        fn details(&self, pid: u32) -> Option<ProcessDetail> {
            self.details.get(&pid).cloned()
        }

        fn working_directory(&self, _pid: u32) -> Option<PathBuf> {
            Some(PathBuf::from("/work/proj"))
        }
    }

    struct Fixture {
        _dir: TempDir,
        cmd_tx: mpsc::Sender<RegistryCommand>,
        actor: RegistryActor,
        snapshots: watch::Receiver<Arc<SessionSnapshot>>,
        polls: Arc<AtomicUsize>,
        cancel: CancellationToken,
    }

    fn create_actor(pids: &[u32]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let polls = Arc::new(AtomicUsize::new(0));
        let details = pids
            .iter()
            .map(|&pid| {
                (
                    pid,
                    ProcessDetail {
                        pid,
                        tty: format!("ttys{pid:03}"),
                        state: "S".to_string(),
                        cpu_percent: 0.0,
                        start_time: None,
                    },
                )
            })
            .collect();
        let source = CountingSource {
            details,
            polls: Arc::clone(&polls),
        };
        let correlator = Correlator::new(LogLocator::new(dir.path()), Vec::new());
        let poller = Poller::new(Box::new(source), correlator);

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (publisher, snapshots) = watch::channel(Arc::new(SessionSnapshot::empty()));
        let cancel = CancellationToken::new();
        let actor = RegistryActor::new(
            cmd_rx,
            poller,
            publisher,
            Duration::from_secs(5),
            cancel.clone(),
        );

        Fixture {
            _dir: dir,
            cmd_tx,
            actor,
            snapshots,
            polls,
            cancel,
        }
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let Fixture {
            _dir,
            cmd_tx,
            actor,
            mut snapshots,
            ..
        } = create_actor(&[10, 20]);
        tokio::spawn(actor.run());

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(RegistryCommand::Refresh {
                respond_to: Some(tx),
            })
            .await
            .unwrap();

        let snapshot = rx.await.unwrap();
        assert_eq!(snapshot.len(), 2);

        snapshots.changed().await.unwrap();
        let published = snapshots.borrow_and_update().clone();
        assert!(Arc::ptr_eq(&published, &snapshot));
    }

    #[tokio::test]
    async fn test_queued_refreshes_share_one_cycle() {
        let Fixture {
            _dir,
            cmd_tx,
            actor,
            polls,
            ..
        } = create_actor(&[1]);

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            cmd_tx
                .send(RegistryCommand::Refresh {
                    respond_to: Some(tx),
                })
                .await
                .unwrap();
            receivers.push(rx);
        }
        cmd_tx.send(RegistryCommand::refresh()).await.unwrap();

        tokio::spawn(actor.run());

        let mut snapshots = Vec::new();
        for rx in receivers {
            snapshots.push(rx.await.unwrap());
        }

        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&snapshots[0], &snapshots[1]));
        assert!(Arc::ptr_eq(&snapshots[1], &snapshots[2]));
    }

    #[tokio::test]
    async fn test_actor_stops_when_channel_closes() {
        let Fixture { _dir, cmd_tx, actor, .. } = create_actor(&[]);
        let task = tokio::spawn(actor.run());

        drop(cmd_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_stops_on_cancel() {
        let Fixture {
            _dir,
            cmd_tx,
            actor,
            cancel,
            ..
        } = create_actor(&[]);
        let task = tokio::spawn(actor.run());

        cancel.cancel();
        task.await.unwrap();
        assert!(cmd_tx.is_closed());
    }

    #[tokio::test]
    async fn test_unchanged_cycles_still_publish() {
        let Fixture {
            _dir,
            cmd_tx,
            actor,
            mut snapshots,
            polls,
            ..
        } = create_actor(&[5]);
        tokio::spawn(actor.run());

        for _ in 0..2 {
            let (tx, rx) = oneshot::channel();
            cmd_tx
                .send(RegistryCommand::Refresh {
                    respond_to: Some(tx),
                })
                .await
                .unwrap();
            rx.await.unwrap();
        }

        assert_eq!(polls.load(Ordering::SeqCst), 2);
        let latest = snapshots.borrow_and_update().clone();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest.sessions[0].title, "Claude Code - proj");
    }
}
