//! Protocol message — one unit of the wire protocol.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::ErrorInfo;

/// Connection properties negotiated by the service, delivered on the
/// CONNECTED action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// Key identifying this connection for resume/recovery.
    #[serde(rename = "connectionKey", skip_serializing_if = "Option::is_none")]
    pub connection_key: Option<String>,
    /// Client identity confirmed by the service, if any.
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Maximum idle interval in milliseconds the service guarantees the
    /// connection will be kept alive without client activity. `0` means
    /// the service declines to guarantee any idle bound.
    #[serde(rename = "maxIdleInterval", default)]
    pub max_idle_interval: u64,
}

/// One unit of the wire protocol: an action tag plus payload fields.
///
/// Immutable after construction. The action fully determines which
/// optional fields are meaningful; fields not meaningful for an action
/// are ignored, never validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(rename = "connectionId", skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(rename = "connectionSerial", skip_serializing_if = "Option::is_none")]
    pub connection_serial: Option<i64>,
    #[serde(rename = "msgSerial", skip_serializing_if = "Option::is_none")]
    pub msg_serial: Option<i64>,
    /// Number of messages covered by a batched ACK/NACK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Present only on CONNECTED.
    #[serde(rename = "connectionDetails", skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<ConnectionDetails>,
}

impl ProtocolMessage {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }

    /// CLOSE control frame sent to request an orderly close.
    pub fn close() -> Self {
        Self::new(Action::Close)
    }

    /// DISCONNECT control frame notifying the peer of an imminent drop.
    pub fn disconnect() -> Self {
        Self::new(Action::Disconnect)
    }

    /// HEARTBEAT frame, optionally correlated with an id.
    pub fn heartbeat(id: Option<String>) -> Self {
        Self {
            action: Action::Heartbeat,
            id,
            ..Default::default()
        }
    }
}

impl std::fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(channel) = &self.channel {
            write!(f, " channel={channel}")?;
        }
        if let Some(serial) = self.msg_serial {
            write!(f, " msgSerial={serial}")?;
        }
        Ok(())
    }
}
