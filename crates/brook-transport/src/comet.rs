//! Comet transport — the HTTP long-poll fallback medium.
//!
//! Built entirely on the [`RequestExecutor`]: `GET {base}/connect`
//! establishes the logical connection (the response is a JSON array of
//! protocol messages, the first carrying CONNECTED), a long-poll
//! `GET {base}/recv` loop streams further batches, and each outbound
//! message is POSTed to `{base}/send` as a one-element array.

use std::sync::Arc;
use std::time::Duration;

use brook_protocol::{
    ErrorInfo, ProtocolMessage,
    error::CODE_BAD_REQUEST,
};
use bytes::Bytes;
use reqwest::{
    Method,
    header::{CONTENT_TYPE, HeaderValue},
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::request::{FallbackRequest, RequestExecutor, ResponseBody};
use crate::transport::{LinkCommand, Transport, TransportCore};

const CONNECT_PATH: &str = "/connect";
const RECV_PATH: &str = "/recv";
const SEND_PATH: &str = "/send";

/// How long a recv request is allowed to hold before the service answers.
const RECV_HOLD: Duration = Duration::from_secs(90);

/// HTTP long-poll fallback transport.
pub struct CometTransport {
    core: Arc<TransportCore>,
    base_url: String,
    executor: RequestExecutor,
}

impl CometTransport {
    pub const NAME: &'static str = "comet";

    /// Construct a proposed transport against an `http(s)://` base URL.
    pub fn new(core: Arc<TransportCore>, base_url: impl Into<String>) -> Self {
        let timeout = core.params().http_request_timeout;
        Self {
            core,
            base_url: base_url.into(),
            executor: RequestExecutor::with_timeout(timeout),
        }
    }

    pub fn core(&self) -> &Arc<TransportCore> {
        &self.core
    }
}

impl Transport for CometTransport {
    fn short_name(&self) -> &'static str {
        Self::NAME
    }

    fn connect(&self) {
        let core = Arc::clone(&self.core);
        let base_url = self.base_url.clone();
        let executor = self.executor.clone();
        tokio::spawn(run_link(core, base_url, executor));
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

async fn run_link(core: Arc<TransportCore>, base_url: String, executor: RequestExecutor) {
    let attempt = Uuid::new_v4();
    debug!("comet connect {base_url} (attempt {attempt})");

    let connect_timeout = core.params().realtime_request_timeout;
    let frames = match fetch_frames(&executor, &core, &base_url, CONNECT_PATH, connect_timeout).await
    {
        Ok(frames) => frames,
        Err(error) => {
            warn!("comet connect failed (attempt {attempt}): {error}");
            core.disconnect(Some(error));
            return;
        }
    };
    info!("comet link up (attempt {attempt})");

    let (tx, rx) = mpsc::unbounded_channel();
    core.install_link(CometTransport::NAME, tx);
    tokio::spawn(run_sender(
        Arc::clone(&core),
        base_url.clone(),
        executor.clone(),
        rx,
    ));

    if !dispatch(&core, frames) {
        return;
    }

    // Long-poll receive loop; stops once the transport reaches a terminal
    // state (finish drops the link, but the in-flight poll must drain).
    while !core.is_finished() {
        match fetch_frames(&executor, &core, &base_url, RECV_PATH, RECV_HOLD).await {
            Ok(frames) => {
                if !dispatch(&core, frames) {
                    break;
                }
            }
            Err(error) => {
                if !core.is_finished() {
                    warn!("comet recv failed: {error}");
                    core.disconnect(Some(error));
                }
                break;
            }
        }
    }
}

/// Drains queued outbound messages, POSTing each to the send endpoint.
async fn run_sender(
    core: Arc<TransportCore>,
    base_url: String,
    executor: RequestExecutor,
    mut rx: UnboundedReceiver<LinkCommand>,
) {
    while let Some(LinkCommand::Send(message)) = rx.recv().await {
        let body = match serde_json::to_vec(&[&message]) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                error!("failed to encode {message}: {e}");
                continue;
            }
        };
        let mut request = FallbackRequest::new(format!("{base_url}{SEND_PATH}"));
        request.method = Some(Method::POST);
        request.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        request.params = connect_params(&core);
        request.body = Some(body);
        if let Err(error) = executor.execute(request).await {
            if !core.is_finished() {
                warn!("comet send failed: {error}");
                core.disconnect(Some(error));
            }
            break;
        }
    }
}

/// Issue one poll request and decode the returned batch of protocol
/// messages (a JSON array; empty responses mean an idle poll cycle).
async fn fetch_frames(
    executor: &RequestExecutor,
    core: &Arc<TransportCore>,
    base_url: &str,
    path: &str,
    timeout: Duration,
) -> Result<Vec<ProtocolMessage>, ErrorInfo> {
    let mut request = FallbackRequest::new(format!("{base_url}{path}"));
    request.params = connect_params(core);
    request.timeout = Some(timeout);
    let response = executor.execute(request).await?;
    match response.body {
        ResponseBody::Json(value) if value.is_null() => Ok(Vec::new()),
        ResponseBody::Json(value) => serde_json::from_value(value).map_err(|e| {
            ErrorInfo::new(CODE_BAD_REQUEST, 400, format!("unreadable frame batch: {e}"))
        }),
        ResponseBody::Text(text) if text.is_empty() => Ok(Vec::new()),
        _ => Err(ErrorInfo::new(
            CODE_BAD_REQUEST,
            400,
            "unexpected frame batch encoding",
        )),
    }
}

fn connect_params(core: &Arc<TransportCore>) -> Vec<(String, String)> {
    let params = core.params();
    vec![
        ("format".into(), params.format.as_str().into()),
        ("heartbeats".into(), params.heartbeats.to_string()),
    ]
}

/// Feed one batch into the dispatcher. Returns false when the link task
/// should stop (terminal state reached or contract breach).
fn dispatch(core: &Arc<TransportCore>, frames: Vec<ProtocolMessage>) -> bool {
    for message in frames {
        if let Err(violation) = core.on_protocol_message(message) {
            error!("{violation}");
            core.fail(Some(violation.to_error_info()));
            return false;
        }
    }
    !core.is_finished()
}
