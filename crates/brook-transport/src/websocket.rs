//! WebSocket transport — the socket-based physical medium.

use std::sync::Arc;

use brook_protocol::{ErrorInfo, ProtocolMessage, error::CODE_CONNECTION_DISCONNECTED};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{LinkCommand, Transport, TransportCore};

/// Socket-based transport: protocol messages as JSON text frames over one
/// WebSocket connection.
pub struct WebSocketTransport {
    core: Arc<TransportCore>,
    url: String,
}

impl WebSocketTransport {
    pub const NAME: &'static str = "ws";

    /// Construct a proposed transport against a `ws://`/`wss://` endpoint.
    /// Nothing is dialed until [`Transport::connect`].
    pub fn new(core: Arc<TransportCore>, url: impl Into<String>) -> Self {
        Self {
            core,
            url: url.into(),
        }
    }

    pub fn core(&self) -> &Arc<TransportCore> {
        &self.core
    }

    fn endpoint(&self) -> String {
        let params = self.core.params();
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}format={}&heartbeats={}",
            self.url,
            params.format.as_str(),
            params.heartbeats
        )
    }
}

impl Transport for WebSocketTransport {
    fn short_name(&self) -> &'static str {
        Self::NAME
    }

    fn connect(&self) {
        let core = Arc::clone(&self.core);
        let endpoint = self.endpoint();
        tokio::spawn(run_link(core, endpoint));
    }

    fn send(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        self.core.send(message)
    }

    fn close(&self) {
        self.core.close();
    }

    fn disconnect(&self, error: Option<ErrorInfo>) {
        self.core.disconnect(error);
    }

    fn fail(&self, error: Option<ErrorInfo>) {
        self.core.fail(error);
    }

    fn ping(&self, id: Option<String>) -> Result<(), TransportError> {
        self.core.ping(id)
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
}

async fn run_link(core: Arc<TransportCore>, endpoint: String) {
    let attempt = Uuid::new_v4();
    debug!("ws dial {endpoint} (attempt {attempt})");

    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("ws dial failed (attempt {attempt}): {e}");
            core.disconnect(Some(ErrorInfo::new(
                CODE_CONNECTION_DISCONNECTED,
                400,
                format!("WebSocket connection failed: {e}"),
            )));
            return;
        }
    };
    info!("ws link up (attempt {attempt})");

    let (mut sink, mut stream) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    core.install_link(WebSocketTransport::NAME, tx);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(LinkCommand::Send(message)) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to encode {message}: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        core.disconnect(Some(ErrorInfo::new(
                            CODE_CONNECTION_DISCONNECTED,
                            400,
                            format!("WebSocket send failed: {e}"),
                        )));
                        break;
                    }
                }
                // Link detached during disposal — close the socket and stop.
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ProtocolMessage>(text.as_str()) {
                        Ok(message) => {
                            if let Err(violation) = core.on_protocol_message(message) {
                                error!("{violation}");
                                core.fail(Some(violation.to_error_info()));
                                break;
                            }
                        }
                        Err(e) => warn!("discarding unparseable frame: {e}"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("ws link closed by peer");
                    core.disconnect(None);
                    break;
                }
                Some(Err(e)) => {
                    warn!("ws link error: {e}");
                    core.disconnect(Some(ErrorInfo::new(
                        CODE_CONNECTION_DISCONNECTED,
                        400,
                        format!("WebSocket error: {e}"),
                    )));
                    break;
                }
                // Binary/ping/pong frames carry no protocol messages here.
                Some(Ok(_)) => {}
            },
        }
    }
}
