//! Registry actor commands and errors.
//!
//! - `RegistryCommand`: messages sent to the actor
//! - `RegistryError`: failures seen by handle callers
//!
//! Snapshots themselves are not sent as events; they are published through
//! a watch channel that always holds the latest one.

use std::sync::Arc;

use ccm_core::SessionSnapshot;
use thiserror::Error;
use tokio::sync::oneshot;

/// Commands sent to the registry actor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Run a poll cycle now and publish the result.
    ///
    /// Sent by the poll timer (without a responder) and by
    /// `RegistryHandle::refresh*`. Refreshes that queue up while a cycle
    /// is running are coalesced into the next single cycle.
    Refresh {
        /// Receives the snapshot the cycle published
        respond_to: Option<oneshot::Sender<Arc<SessionSnapshot>>>,
    },
}

impl RegistryCommand {
    /// A refresh nobody waits on.
    pub fn refresh() -> Self {
        Self::Refresh { respond_to: None }
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The actor has shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_has_no_responder() {
        assert!(matches!(
            RegistryCommand::refresh(),
            RegistryCommand::Refresh { respond_to: None }
        ));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RegistryError::ChannelClosed.to_string(), "registry channel closed");
    }
}
