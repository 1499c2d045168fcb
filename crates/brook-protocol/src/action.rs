//! Protocol action codes.
//!
//! Every protocol message carries a numeric `action` tag that fully
//! determines how the message is dispatched. The codes are wire-stable:
//! they are serialized as bare integers and must never be renumbered.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The discriminant tag on a protocol message.
///
/// Connection-level actions (HEARTBEAT, CONNECTED, CLOSED, DISCONNECTED,
/// ACK, NACK, ERROR without a channel, SYNC with a connection id, AUTH)
/// are consumed by the transport; everything else is channel-scoped and
/// forwarded to the channel layer unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Heartbeat,
    Ack,
    Nack,
    Connect,
    Connected,
    Disconnect,
    Disconnected,
    Close,
    Closed,
    Error,
    Attach,
    Attached,
    Detach,
    Detached,
    Presence,
    Message,
    Sync,
    Auth,
}

impl Action {
    /// The numeric wire code for this action.
    pub fn code(&self) -> u8 {
        match self {
            Self::Heartbeat => 0,
            Self::Ack => 1,
            Self::Nack => 2,
            Self::Connect => 3,
            Self::Connected => 4,
            Self::Disconnect => 5,
            Self::Disconnected => 6,
            Self::Close => 7,
            Self::Closed => 8,
            Self::Error => 9,
            Self::Attach => 10,
            Self::Attached => 11,
            Self::Detach => 12,
            Self::Detached => 13,
            Self::Presence => 14,
            Self::Message => 15,
            Self::Sync => 16,
            Self::Auth => 17,
        }
    }

    /// Look up an action by wire code. Unknown codes return `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Heartbeat,
            1 => Self::Ack,
            2 => Self::Nack,
            3 => Self::Connect,
            4 => Self::Connected,
            5 => Self::Disconnect,
            6 => Self::Disconnected,
            7 => Self::Close,
            8 => Self::Closed,
            9 => Self::Error,
            10 => Self::Attach,
            11 => Self::Attached,
            12 => Self::Detach,
            13 => Self::Detached,
            14 => Self::Presence,
            15 => Self::Message,
            16 => Self::Sync,
            17 => Self::Auth,
            _ => return None,
        })
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Message
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Action::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown action code: {code}")))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Heartbeat => "HEARTBEAT",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Disconnect => "DISCONNECT",
            Self::Disconnected => "DISCONNECTED",
            Self::Close => "CLOSE",
            Self::Closed => "CLOSED",
            Self::Error => "ERROR",
            Self::Attach => "ATTACH",
            Self::Attached => "ATTACHED",
            Self::Detach => "DETACH",
            Self::Detached => "DETACHED",
            Self::Presence => "PRESENCE",
            Self::Message => "MESSAGE",
            Self::Sync => "SYNC",
            Self::Auth => "AUTH",
        };
        f.write_str(name)
    }
}
