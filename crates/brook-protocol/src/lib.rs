//! Brook realtime protocol — wire-level value types.
//!
//! One unit of the wire protocol is a [`ProtocolMessage`]: an action tag
//! plus whatever optional fields that action makes meaningful. This crate
//! is the single source of truth for the action table, the message shape,
//! and the service error value carried in messages and HTTP responses.
//!
//! Nothing here owns a connection — the transport layer
//! (`brook-transport`) consumes these types.

pub mod action;
pub mod error;
pub mod message;

pub use action::Action;
pub use error::ErrorInfo;
pub use message::{ConnectionDetails, ProtocolMessage};
