//! Single-shot HTTP request executor.
//!
//! The request/response primitive behind the comet fallback transport and
//! non-streaming API calls: one request, a hard timeout, content-type
//! classification of the response body, and extraction of service error
//! codes from response headers. Every failure mode — timeout, network
//! error, non-2xx status — is delivered as an [`ErrorInfo`] result;
//! nothing leaks past this boundary.

use std::time::Duration;

use brook_protocol::{
    ErrorInfo,
    error::{CODE_BAD_REQUEST, CODE_CONNECTION_FAILED},
};
use bytes::Bytes;
use reqwest::{
    Method, StatusCode,
    header::{CONTENT_TYPE, HeaderMap},
};
use tracing::{debug, warn};

/// Response header carrying a service-specific error code. When present on
/// a failed response, the body is expected to carry a structured error
/// object under `"error"`.
pub const ERROR_CODE_HEADER: &str = "x-brook-errorcode";

/// Content type of binary-packed response bodies.
pub const BINARY_CONTENT_TYPE: &str = "application/x-msgpack";

/// Default hard timeout when neither the executor nor the call overrides it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A request, fully described. The header map is cloned into the outgoing
/// request; the caller's copy is never mutated.
#[derive(Debug, Default)]
pub struct FallbackRequest {
    /// Effective method is the caller's choice, or GET when no body was
    /// supplied, POST otherwise.
    pub method: Option<Method>,
    pub url: String,
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Per-call override of the executor's timeout.
    pub timeout: Option<Duration>,
}

impl FallbackRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Response body, already decoded per its declared content type. Exactly
/// one decode path is taken.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// Binary-packed payload, left raw for the codec layer above.
    Packed(Bytes),
    /// Structured text (JSON).
    Json(serde_json::Value),
    /// Anything else, including responses with no declared content type.
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Readable rendering for error messages.
    fn render(&self) -> String {
        match self {
            Self::Packed(bytes) => format!("<{} bytes of packed data>", bytes.len()),
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug)]
pub struct FallbackResponse {
    pub body: ResponseBody,
    pub headers: HeaderMap,
    /// True exactly when a content type was declared and it is not the
    /// binary-packed type — a hint that a structured/text encoding was
    /// actually used. Absent content type yields `false`.
    pub packed: bool,
    pub status: StatusCode,
}

/// Executes single-shot requests over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Use a caller-configured client (connection pools, proxies, cookie
    /// and credential policy all belong to the client).
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Issue one request with a hard deadline.
    ///
    /// The timer is disarmed as soon as response headers arrive; firing
    /// cancels the in-flight request (dropping it is the single abort) and
    /// reports the 408 timeout error. Reading the body is not under the
    /// timer.
    pub async fn execute(&self, request: FallbackRequest) -> Result<FallbackResponse, ErrorInfo> {
        let method = request
            .method
            .clone()
            .unwrap_or(if request.body.is_none() {
                Method::GET
            } else {
                Method::POST
            });
        debug!("{method} {}", request.url);

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(request.headers.clone());
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let deadline = request.timeout.unwrap_or(self.timeout);
        let response = match tokio::time::timeout(deadline, builder.send()).await {
            Err(_) => {
                warn!("request to {} timed out after {}ms", request.url, deadline.as_millis());
                return Err(ErrorInfo::timed_out());
            }
            Ok(Err(e)) => {
                return Err(ErrorInfo::new(
                    CODE_CONNECTION_FAILED,
                    400,
                    format!("request failed: {e}"),
                ));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            ErrorInfo::new(
                CODE_CONNECTION_FAILED,
                400,
                format!("failed to read response body: {e}"),
            )
        })?;

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let is_binary = content_type.is_some_and(|ct| ct.starts_with(BINARY_CONTENT_TYPE));
        let packed = content_type.is_some() && !is_binary;
        let body = if is_binary {
            ResponseBody::Packed(bytes)
        } else if content_type.is_some_and(|ct| ct.starts_with("application/json")) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => {
                    return Err(ErrorInfo::new(
                        CODE_BAD_REQUEST,
                        400,
                        format!("unreadable JSON response body: {e}"),
                    ));
                }
            }
        } else {
            ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
        };

        if !status.is_success() {
            let error = if headers.contains_key(ERROR_CODE_HEADER) {
                embedded_error(&body)
                    .unwrap_or_else(|| ErrorInfo::from_status(status.as_u16(), body.render()))
            } else {
                ErrorInfo::from_status(status.as_u16(), body.render())
            };
            return Err(error);
        }

        Ok(FallbackResponse {
            body,
            headers,
            packed,
            status,
        })
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// The structured error object embedded in a failed response body.
fn embedded_error(body: &ResponseBody) -> Option<ErrorInfo> {
    let value = body.as_json()?.get("error")?;
    serde_json::from_value(value.clone()).ok()
}
