//! Brook realtime transport layer.
//!
//! Maintains one logical, persistent, bidirectional connection to the
//! messaging service over an interchangeable physical transport. The layer
//! handles:
//! - Connection lifecycle (proposed, connected, closed/disconnected/failed,
//!   disposed) and the event contract to the owning connection manager
//! - Protocol-message dispatch: connection-level actions are consumed here,
//!   channel-scoped traffic is handed off unmodified
//! - Idle-connection liveness: heartbeat-negotiated idle bound plus a
//!   single re-arming timer that detects a silently-dead connection
//! - The single-shot HTTP request primitive used by the comet fallback
//!   transport and non-streaming API calls
//!
//! The transport is decoupled from the connection manager via the
//! [`ChannelSink`] and [`AuthProvider`] traits and a typed event channel;
//! transport selection and reconnection policy live above this crate.

pub mod activity;
pub mod comet;
pub mod error;
pub mod events;
pub mod params;
pub mod request;
pub mod traits;
pub mod transport;
pub mod websocket;

pub use comet::CometTransport;
pub use error::{ContractViolation, TransportError};
pub use events::TransportEvent;
pub use params::{Format, TransportParams};
pub use request::{FallbackRequest, FallbackResponse, RequestExecutor, ResponseBody};
pub use traits::{ActivityClock, AuthCallback, AuthProvider, ChannelSink};
pub use transport::{LinkCommand, Transport, TransportCore};
pub use websocket::WebSocketTransport;
