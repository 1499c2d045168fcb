//! Collaborator seams between a transport and its owning connection manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use brook_protocol::{ErrorInfo, ProtocolMessage};
use tokio::time::Instant;

/// Completion callback for a re-authorization attempt.
pub type AuthCallback = Box<dyn FnOnce(Result<(), ErrorInfo>) + Send + 'static>;

/// Sink for protocol messages that are not consumed at the transport layer
/// (channel-scoped ERROR, SYNC without a connection id, ATTACHED, MESSAGE,
/// PRESENCE, and anything else addressed to a channel).
pub trait ChannelSink: Send + Sync + 'static {
    fn on_channel_message(&self, message: ProtocolMessage);
}

/// Token-renewal collaborator. Invoked when the service sends AUTH.
pub trait AuthProvider: Send + Sync + 'static {
    /// Re-authorize with the service and report completion through `done`.
    /// The transport treats renewal as best-effort: failures are logged,
    /// never propagated.
    fn reauthorize(&self, done: AuthCallback);
}

/// Shared last-activity clock owned by the connection manager.
///
/// Every transport stamps it on every inbound message, so components that
/// hold no transport reference can still reason about global liveness.
/// Writers never coordinate: updates are last-write-wins on a monotonically
/// non-decreasing timestamp.
#[derive(Debug)]
pub struct ActivityClock {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Milliseconds since the clock epoch of the most recent activity tick
    /// (0 when nothing has been recorded yet).
    pub fn last_activity_ms(&self) -> u64 {
        self.last_ms.load(Ordering::Relaxed)
    }

    /// Time since the most recent activity tick. Equals time since clock
    /// creation when no activity has been recorded.
    pub fn since_last_activity(&self) -> Duration {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(elapsed.saturating_sub(self.last_activity_ms()))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
