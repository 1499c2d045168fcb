//! Transport parameters.

use std::time::Duration;

/// Wire encoding negotiated with the service.
///
/// JSON is the encode path this crate ships; msgpack response bodies pass
/// through as raw bytes for the codec layer above to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    MsgPack,
}

impl Format {
    /// Value of the `format` connect query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::MsgPack => "application/x-msgpack",
        }
    }
}

/// Connection parameters for a single transport instance.
#[derive(Debug, Clone)]
pub struct TransportParams {
    /// Wire encoding requested at connect time.
    pub format: Format,
    /// Whether this client supports heartbeat-based liveness.
    pub heartbeats: bool,
    /// Timeout for realtime operations; also the margin added to the
    /// service's `maxIdleInterval` when arming the idle monitor.
    pub realtime_request_timeout: Duration,
    /// Default hard timeout for single-shot HTTP requests.
    pub http_request_timeout: Duration,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            format: Format::Json,
            heartbeats: true,
            realtime_request_timeout: Duration::from_secs(10),
            http_request_timeout: Duration::from_secs(10),
        }
    }
}
