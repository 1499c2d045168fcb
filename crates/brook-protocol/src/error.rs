//! Service error value and the Brook error code space.
//!
//! Error codes are five-digit integers assigned by the service; the
//! `status_code` is the nearest HTTP equivalent. Codes used by the
//! transport layer itself:
//!
//! - `40000` — bad request (e.g. an unreadable response body), status 400
//! - `50000` — internal fault / protocol contract breach, status 500
//! - `50003` — request timed out, status 408
//! - `80000` — connection failed, status 400
//! - `80003` — connection disconnected, status 400
//!   (idle timeout uses `80003` with status 408)

use serde::{Deserialize, Serialize};

pub const CODE_BAD_REQUEST: u32 = 40_000;
pub const CODE_INTERNAL: u32 = 50_000;
pub const CODE_TIMED_OUT: u32 = 50_003;
pub const CODE_CONNECTION_FAILED: u32 = 80_000;
pub const CODE_CONNECTION_DISCONNECTED: u32 = 80_003;

/// A service error: a Brook error code, the nearest HTTP status, and a
/// human-readable message.
///
/// Carried on ERROR/DISCONNECTED/CLOSED protocol messages, embedded in
/// failed HTTP response bodies, and attached to transport lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u32,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: u32, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status_code,
            message: message.into(),
        }
    }

    /// Generic recoverable-disconnect error.
    pub fn disconnected() -> Self {
        Self::new(CODE_CONNECTION_DISCONNECTED, 400, "Connection disconnected")
    }

    /// Generic fatal connection failure.
    pub fn failed() -> Self {
        Self::new(CODE_CONNECTION_FAILED, 400, "Connection failed")
    }

    /// Request timed out before response headers arrived.
    pub fn timed_out() -> Self {
        Self::new(CODE_TIMED_OUT, 408, "Request timed out")
    }

    /// Idle timeout: no inbound activity within the negotiated bound.
    /// Classified as recoverable (disconnected), status 408.
    pub fn idle_timeout(elapsed_ms: u64) -> Self {
        Self::new(
            CODE_CONNECTION_DISCONNECTED,
            408,
            format!("No activity seen from the service for {elapsed_ms}ms; assuming connection has dropped"),
        )
    }

    /// Generic error synthesized from an HTTP failure status and a
    /// readable rendering of the response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.is_empty() {
            format!("HTTP request failed with status {status}")
        } else {
            format!("HTTP request failed with status {status}: {body}")
        };
        Self::new(u32::from(status) * 100, status, message)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.code, self.status_code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}
