//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for requesting
//! refreshes and reading the published snapshot.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::sync::Arc;

use ccm_core::{Session, SessionSnapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::commands::{RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// Reads never touch the actor: they return the last snapshot it
/// published, so they never block on a running poll cycle.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// // Latest published state
/// let sessions = handle.sessions();
///
/// // Watch for new snapshots
/// let mut rx = handle.subscribe();
/// while rx.changed().await.is_ok() {
///     let snapshot = rx.borrow_and_update().clone();
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Latest published snapshot
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        snapshots: watch::Receiver<Arc<SessionSnapshot>>,
    ) -> Self {
        Self { sender, snapshots }
    }

    /// Request an out-of-schedule poll cycle (fire-and-forget).
    ///
    /// Does not wait for the cycle. If the command queue is full a refresh
    /// is already pending, so the request is dropped.
    pub fn refresh(&self) {
        if let Err(e) = self.sender.try_send(RegistryCommand::refresh()) {
            debug!(error = %e, "Refresh request not queued");
        }
    }

    /// Request a poll cycle and wait for the snapshot it publishes.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn refresh_and_wait(&self) -> Result<Arc<SessionSnapshot>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Refresh {
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// The last published snapshot.
    ///
    /// Before the first cycle completes this is an empty snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Sessions from the last published snapshot, newest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.snapshots.borrow().sessions.clone()
    }

    /// Number of sessions needing input in the last published snapshot.
    pub fn waiting_count(&self) -> usize {
        self.snapshots.borrow().waiting_count
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// Check if the registry actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::SessionStatus;
    use chrono::Utc;

    fn create_test_handle() -> (
        RegistryHandle,
        mpsc::Receiver<RegistryCommand>,
        watch::Sender<Arc<SessionSnapshot>>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (publisher, snapshots) = watch::channel(Arc::new(SessionSnapshot::empty()));
        (RegistryHandle::new(cmd_tx, snapshots), cmd_rx, publisher)
    }

    fn snapshot_with(statuses: &[SessionStatus]) -> SessionSnapshot {
        let sessions = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let pid = i as u32 + 1;
                Session::new(pid, format!("ttys{pid:03}"), format!("s{pid}"), *status, None)
            })
            .collect();
        SessionSnapshot::new(sessions, Utc::now())
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx, _publisher) = create_test_handle();
        let _clone = handle.clone();
    }

    #[tokio::test]
    async fn test_refresh_sends_command() {
        let (handle, mut rx, _publisher) = create_test_handle();

        handle.refresh();

        match rx.recv().await {
            Some(RegistryCommand::Refresh { respond_to }) => assert!(respond_to.is_none()),
            None => panic!("expected a refresh command"),
        }
    }

    #[tokio::test]
    async fn test_refresh_drops_request_when_queue_full() {
        let (handle, mut rx, _publisher) = create_test_handle();

        handle.refresh();
        handle.refresh();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_ignores_closed_channel() {
        let (handle, rx, _publisher) = create_test_handle();
        drop(rx);

        handle.refresh();
    }

    #[tokio::test]
    async fn test_refresh_and_wait_receives_snapshot() {
        let (handle, mut rx, _publisher) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(RegistryCommand::Refresh {
                respond_to: Some(tx),
            }) = rx.recv().await
            {
                let _ = tx.send(Arc::new(snapshot_with(&[SessionStatus::Waiting])));
            }
        });

        let snapshot = handle.refresh_and_wait().await.unwrap();
        assert_eq!(snapshot.waiting_count, 1);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_and_wait_channel_closed_error() {
        let (handle, rx, _publisher) = create_test_handle();
        drop(rx);

        let result = handle.refresh_and_wait().await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_reads_return_published_snapshot() {
        let (handle, _rx, publisher) = create_test_handle();
        assert!(handle.snapshot().is_empty());
        assert_eq!(handle.waiting_count(), 0);

        publisher.send_replace(Arc::new(snapshot_with(&[
            SessionStatus::Waiting,
            SessionStatus::Working,
            SessionStatus::Waiting,
        ])));

        assert_eq!(handle.sessions().len(), 3);
        assert_eq!(handle.waiting_count(), 2);
        assert_eq!(handle.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_subscribe_sees_new_snapshot() {
        let (handle, _rx, publisher) = create_test_handle();
        let mut sub = handle.subscribe();

        publisher.send_replace(Arc::new(snapshot_with(&[SessionStatus::Idle])));

        sub.changed().await.unwrap();
        assert_eq!(sub.borrow_and_update().len(), 1);
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx, _publisher) = create_test_handle();
        assert!(handle.is_connected());

        drop(rx);
        assert!(!handle.is_connected());
    }
}
