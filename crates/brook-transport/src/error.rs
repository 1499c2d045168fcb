//! Transport-local error types.

use brook_protocol::{ErrorInfo, error::CODE_INTERNAL};

/// Errors surfaced by transport send-path operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport already finished")]
    Finished,
    #[error("physical link closed")]
    LinkClosed,
}

/// A breach of the wire-protocol contract by the peer.
///
/// Deliberately a distinct type from [`TransportError`]: a contract breach
/// is an unrecoverable internal fault, and must not be caught and handled
/// like an ordinary network error. Downstream idle-detection logic depends
/// on these invariants holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// CONNECTED is always expected to carry connection details.
    #[error("CONNECTED message did not carry connection details")]
    MissingConnectionDetails,
    /// The idle timer is only ever armed after an activity stamp.
    #[error("idle timer fired with no recorded activity baseline")]
    MissingActivityBaseline,
}

impl ContractViolation {
    /// Render as the internal-fault service error attached to a `failed`
    /// outcome.
    pub fn to_error_info(self) -> ErrorInfo {
        ErrorInfo::new(CODE_INTERNAL, 500, format!("protocol contract violation: {self}"))
    }
}
