//! Shared transport lifecycle machine and protocol-message dispatch.
//!
//! One [`TransportCore`] backs every physical transport. A concrete
//! transport (WebSocket, comet) embeds the core, installs its outbound
//! link when the physical connection comes up, and feeds inbound protocol
//! messages into [`TransportCore::on_protocol_message`]. The core owns the
//! lifecycle flags, the idle monitor, and the event channel to the
//! connection manager.
//!
//! Lifecycle: proposed (constructed, registered with the owner, no
//! physical connection yet) → connected (CONNECTED processed) → finished
//! (exactly one of closed/disconnected/failed) → disposed. `finish` is the
//! single serialization point for terminal transitions; every terminal
//! trigger funnels through its ignore-if-already-finished gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use brook_protocol::{Action, ConnectionDetails, ErrorInfo, ProtocolMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

use crate::activity::{self, IdleState};
use crate::error::{ContractViolation, TransportError};
use crate::events::TransportEvent;
use crate::params::TransportParams;
use crate::traits::{ActivityClock, AuthProvider, ChannelSink};

/// Command queued to the physical medium's write half.
#[derive(Debug)]
pub enum LinkCommand {
    Send(ProtocolMessage),
}

/// The installed physical link: a name tag plus the outbound queue.
struct Link {
    name: &'static str,
    tx: UnboundedSender<LinkCommand>,
}

/// Terminal classification a transport reaches exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Closed,
    Disconnected,
    Failed,
}

/// Capability contract every physical transport satisfies.
///
/// The lifecycle machine, idle monitor, and dispatch logic live in
/// [`TransportCore`]; implementations embed a core and add only the
/// medium-specific connect hook and send path.
pub trait Transport: Send + Sync {
    /// Short tag identifying the physical medium (e.g. `"ws"`, `"comet"`).
    fn short_name(&self) -> &'static str;

    /// Begin establishing the physical link. Fire-and-forget: progress and
    /// failure are reported through lifecycle events, never returned.
    fn connect(&self);

    fn send(&self, message: ProtocolMessage) -> Result<(), TransportError>;
    fn close(&self);
    fn disconnect(&self, error: Option<ErrorInfo>);
    fn fail(&self, error: Option<ErrorInfo>);
    fn ping(&self, id: Option<String>) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    fn is_finished(&self) -> bool;
}

/// Shared state and behavior behind every physical transport.
pub struct TransportCore {
    params: TransportParams,
    channels: Arc<dyn ChannelSink>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<ActivityClock>,
    events: Mutex<Option<UnboundedSender<TransportEvent>>>,
    link: Mutex<Option<Link>>,
    connected: AtomicBool,
    finished: AtomicBool,
    disposed: AtomicBool,
    pub(crate) idle: Mutex<IdleState>,
}

impl TransportCore {
    /// Create a proposed transport core. The returned receiver is the
    /// owner's subscription to the full notification contract; registration
    /// consists of the owner holding it for the transport's lifetime.
    pub fn new(
        params: TransportParams,
        channels: Arc<dyn ChannelSink>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<ActivityClock>,
    ) -> (Arc<Self>, UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::new(Self {
            params,
            channels,
            auth,
            clock,
            events: Mutex::new(Some(tx)),
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            idle: Mutex::new(IdleState::default()),
        });
        (core, rx)
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Install the outbound link for a physical medium that has come up.
    /// A link arriving after the transport finished is dropped on the
    /// floor, which closes the medium's command queue.
    pub fn install_link(&self, name: &'static str, tx: UnboundedSender<LinkCommand>) {
        if self.is_finished() {
            debug!("{name} link came up after transport finished; dropping");
            return;
        }
        *self.link.lock() = Some(Link { name, tx });
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn send_frame(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        match self.link.lock().as_ref() {
            Some(link) => link
                .tx
                .send(LinkCommand::Send(message))
                .map_err(|_| TransportError::LinkClosed),
            None => Err(TransportError::NotConnected),
        }
    }

    /// Queue an outbound protocol message. Fire-and-forget: the message is
    /// handed to the physical medium's write half.
    pub fn send(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        if self.is_finished() {
            return Err(TransportError::Finished);
        }
        self.send_frame(message)
    }

    /// Send a HEARTBEAT, optionally correlated with an id.
    pub fn ping(&self, id: Option<String>) -> Result<(), TransportError> {
        self.send(ProtocolMessage::heartbeat(id))
    }

    /// Request an orderly close. Sends CLOSE to the peer when connected,
    /// then unconditionally finishes with outcome `closed`.
    pub fn close(&self) {
        if self.is_connected() {
            if let Err(e) = self.send_frame(ProtocolMessage::close()) {
                debug!("could not send CLOSE: {e}");
            }
        }
        self.finish(Outcome::Closed, None);
    }

    /// Finish with outcome `disconnected` for a recoverable network-layer
    /// problem. Sends DISCONNECT to the peer when connected. The owner's
    /// connection must never treat this as terminal.
    pub fn disconnect(&self, error: Option<ErrorInfo>) {
        if self.is_connected() {
            if let Err(e) = self.send_frame(ProtocolMessage::disconnect()) {
                debug!("could not send DISCONNECT: {e}");
            }
        }
        self.finish(
            Outcome::Disconnected,
            Some(error.unwrap_or_else(ErrorInfo::disconnected)),
        );
    }

    /// Finish with outcome `failed` for a client-detected fatal condition.
    /// DISCONNECT is sent to the peer as best-effort notification.
    pub fn fail(&self, error: Option<ErrorInfo>) {
        if self.is_connected() {
            if let Err(e) = self.send_frame(ProtocolMessage::disconnect()) {
                debug!("could not send DISCONNECT: {e}");
            }
        }
        self.finish(
            Outcome::Failed,
            Some(error.unwrap_or_else(ErrorInfo::failed)),
        );
    }

    /// The single terminal gate. Idempotent: the first caller wins, every
    /// later call is a silent no-op.
    pub(crate) fn finish(&self, outcome: Outcome, error: Option<ErrorInfo>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        {
            let mut idle = self.idle.lock();
            idle.max_idle = None;
            idle.last_activity = None;
            if let Some(timer) = idle.timer.take() {
                timer.abort();
            }
        }
        match &error {
            Some(e) => info!("transport finished ({outcome:?}): {e}"),
            None => info!("transport finished ({outcome:?})"),
        }
        self.emit(match outcome {
            Outcome::Closed => TransportEvent::Closed { error },
            Outcome::Disconnected => TransportEvent::Disconnected { error },
            Outcome::Failed => TransportEvent::Failed { error },
        });
        self.dispose();
    }

    /// Mark disposed and detach all listeners. Reached exactly once, from
    /// `finish`; the `finished` gate enforces that.
    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Disposed);
        *self.events.lock() = None;
        *self.link.lock() = None;
    }

    /// Dispatch one inbound protocol message.
    ///
    /// Every inbound message records activity first. Connection-level
    /// actions are consumed here; channel-scoped messages go to the
    /// channel sink unmodified. A finished transport ignores everything.
    pub fn on_protocol_message(
        self: &Arc<Self>,
        message: ProtocolMessage,
    ) -> Result<(), ContractViolation> {
        if self.is_finished() {
            trace!("ignoring {message} on finished transport");
            return Ok(());
        }
        trace!("recv {message}");
        self.on_activity();
        match message.action {
            Action::Heartbeat => self.emit(TransportEvent::Heartbeat { id: message.id }),
            Action::Connected => {
                let connection_details = self.on_connected(&message)?;
                self.emit(TransportEvent::Connected {
                    error: message.error.clone(),
                    connection_id: message.connection_id.clone(),
                    connection_details,
                    message,
                });
            }
            Action::Closed => self.finish(Outcome::Closed, message.error),
            Action::Disconnected => self.finish(Outcome::Disconnected, message.error),
            Action::Ack => self.emit(TransportEvent::Ack {
                serial: message.msg_serial,
                count: message.count.unwrap_or(1),
            }),
            Action::Nack => self.emit(TransportEvent::Nack {
                serial: message.msg_serial,
                count: message.count.unwrap_or(1),
                error: message.error,
            }),
            Action::Sync => match message.connection_id.clone() {
                Some(connection_id) => self.emit(TransportEvent::Sync {
                    connection_id,
                    message,
                }),
                None => self.channels.on_channel_message(message),
            },
            Action::Auth => {
                debug!("service requested re-authorization");
                self.auth.reauthorize(Box::new(|result| {
                    if let Err(error) = result {
                        // Best-effort: renewal failures are logged, never propagated.
                        warn!("re-authorization failed: {error}");
                    }
                }));
            }
            Action::Error if message.channel.is_none() => {
                self.finish(Outcome::Failed, message.error);
            }
            _ => self.channels.on_channel_message(message),
        }
        Ok(())
    }

    /// CONNECTED handling: mark connected, then arm the idle monitor from
    /// the negotiated `maxIdleInterval` plus the realtime request-timeout
    /// margin. A CONNECTED without connection details is a contract breach.
    fn on_connected(
        self: &Arc<Self>,
        message: &ProtocolMessage,
    ) -> Result<ConnectionDetails, ContractViolation> {
        self.connected.store(true, Ordering::SeqCst);
        let details = message
            .connection_details
            .clone()
            .ok_or(ContractViolation::MissingConnectionDetails)?;
        if details.max_idle_interval > 0 {
            let max_idle = Duration::from_millis(details.max_idle_interval)
                + self.params.realtime_request_timeout;
            self.idle.lock().max_idle = Some(max_idle);
            self.on_activity();
            debug!(
                "connected; idle monitor armed for {}ms",
                max_idle.as_millis()
            );
        } else {
            // The peer declines to guarantee an idle bound; monitor stays off.
            debug!("connected; no idle bound negotiated");
        }
        Ok(details)
    }

    /// Record inbound activity: stamp the local and shared clocks and make
    /// sure one idle timer is pending. No-op unless an idle bound is set;
    /// arming while a timer is already pending is a no-op — the existing
    /// timer owns the next check.
    pub(crate) fn on_activity(self: &Arc<Self>) {
        let mut idle = self.idle.lock();
        let Some(max_idle) = idle.max_idle else {
            return;
        };
        idle.last_activity = Some(tokio::time::Instant::now());
        self.clock.touch();
        if idle.timer.is_some() {
            return;
        }
        let wait = max_idle + activity::IDLE_TIMER_SLACK;
        idle.timer = Some(tokio::spawn(activity::run_idle_timer(
            Arc::clone(self),
            wait,
        )));
    }

    /// Name tag of the installed physical link, if one is up.
    pub fn link_name(&self) -> Option<&'static str> {
        self.link.lock().as_ref().map(|link| link.name)
    }
}

impl std::fmt::Debug for TransportCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportCore")
            .field("connected", &self.is_connected())
            .field("finished", &self.is_finished())
            .field("disposed", &self.is_disposed())
            .field("link", &self.link_name())
            .finish()
    }
}
