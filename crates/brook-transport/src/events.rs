//! Lifecycle and notification events emitted to the connection manager.

use brook_protocol::{ConnectionDetails, ErrorInfo, ProtocolMessage};

/// Notification contract between a transport and its owner.
///
/// Delivered over the channel returned by
/// [`TransportCore::new`](crate::transport::TransportCore::new). Exactly one
/// of `Closed`/`Disconnected`/`Failed` fires per transport, followed by
/// `Disposed`; after that the sender is detached and nothing further is
/// emitted.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The CONNECTED action was processed; the transport is live.
    Connected {
        error: Option<ErrorInfo>,
        connection_id: Option<String>,
        connection_details: ConnectionDetails,
        message: ProtocolMessage,
    },
    /// Orderly termination, locally requested or peer-initiated.
    Closed { error: Option<ErrorInfo> },
    /// Recoverable termination — the owner may reconnect.
    Disconnected { error: Option<ErrorInfo> },
    /// Fatal connection-level termination.
    Failed { error: Option<ErrorInfo> },
    /// Cleanup complete; listeners are detached after this.
    Disposed,
    /// Transport-level SYNC (carries a connection id).
    Sync {
        connection_id: String,
        message: ProtocolMessage,
    },
    /// The service acknowledged published messages.
    Ack { serial: Option<i64>, count: u32 },
    /// The service rejected published messages.
    Nack {
        serial: Option<i64>,
        count: u32,
        error: Option<ErrorInfo>,
    },
    /// Peer heartbeat, optionally correlated with a ping id.
    Heartbeat { id: Option<String> },
}
