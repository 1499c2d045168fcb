//! Idle-connection monitor.
//!
//! Detects a connection that has gone silent beyond the negotiated
//! tolerance even though the physical transport has not reported a
//! failure. One timer task is pending per transport at most; it is armed
//! by the first activity stamp after CONNECTED and re-armed by its own
//! premature wake-ups, never by later activity.

use std::sync::Arc;
use std::time::Duration;

use brook_protocol::ErrorInfo;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::ContractViolation;
use crate::transport::TransportCore;

/// Tolerance for clock and scheduler jitter when arming the idle timer.
pub const IDLE_TIMER_SLACK: Duration = Duration::from_millis(100);

/// Live idle-monitor state, held by the transport core.
#[derive(Debug, Default)]
pub(crate) struct IdleState {
    /// Negotiated `maxIdleInterval` plus the request-timeout margin.
    /// `None` while unconnected, when the peer declines to guarantee an
    /// idle bound, and after finish.
    pub max_idle: Option<Duration>,
    pub last_activity: Option<Instant>,
    pub timer: Option<JoinHandle<()>>,
}

enum Verdict {
    /// Monitor was cleared while we slept.
    Stop,
    /// Elapsed idle time reached the bound.
    Expired(u64),
    /// Activity happened after the timer was armed; sleep out the rest.
    Premature(Duration),
    /// Armed timer with no activity baseline — a contract breach.
    Fault,
}

/// The single pending idle timer for one transport.
///
/// Sleeps `wait`, then checks elapsed time since the last activity stamp:
/// expired → disconnect with the idle-timeout error; premature → re-arm
/// for the remaining time plus slack. The two-step check avoids firing
/// early from slack accumulation while still detecting a dead connection
/// within one slack interval of the true deadline.
pub(crate) async fn run_idle_timer(core: Arc<TransportCore>, mut wait: Duration) {
    loop {
        tokio::time::sleep(wait).await;
        let verdict = {
            let mut idle = core.idle.lock();
            match (idle.max_idle, idle.last_activity) {
                (None, _) => Verdict::Stop,
                (Some(_), None) => Verdict::Fault,
                (Some(max_idle), Some(last)) => {
                    let elapsed = last.elapsed();
                    if elapsed >= max_idle {
                        idle.timer = None;
                        Verdict::Expired(elapsed.as_millis() as u64)
                    } else {
                        Verdict::Premature(max_idle - elapsed + IDLE_TIMER_SLACK)
                    }
                }
            }
        };
        match verdict {
            Verdict::Stop => break,
            Verdict::Premature(rest) => {
                debug!("idle check premature; re-arming for {}ms", rest.as_millis());
                wait = rest;
            }
            Verdict::Expired(elapsed_ms) => {
                warn!("no activity for {elapsed_ms}ms; dropping connection");
                core.disconnect(Some(ErrorInfo::idle_timeout(elapsed_ms)));
                break;
            }
            Verdict::Fault => {
                let violation = ContractViolation::MissingActivityBaseline;
                error!("{violation}");
                core.fail(Some(violation.to_error_info()));
                break;
            }
        }
    }
}
