//! HTTP transport used to reach the remote providers.
//!
//! Requests are described by [`ServiceRequest`] and sent through an
//! [`HttpTransport`]. The shipped implementation wraps a blocking `ureq`
//! agent with an explicit timeout; async callers go through [`run_blocking`].

use std::fmt;
use std::io::Read;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::location::LocationError;

/// Timeout applied to every remote call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which kind of remote call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceIdentifier {
    RemoteGeocode,
    DistanceMatrix,
    DeviceGeocode,
    IpGeolocation,
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteGeocode => write!(f, "remote-geocode"),
            Self::DistanceMatrix => write!(f, "distance-matrix"),
            Self::DeviceGeocode => write!(f, "device-geocode"),
            Self::IpGeolocation => write!(f, "ip-geolocation"),
        }
    }
}

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl ServiceMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A fully described outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub identifier: ServiceIdentifier,
    pub method: ServiceMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ServiceRequest {
    pub fn get(identifier: ServiceIdentifier, url: impl Into<String>) -> Self {
        Self {
            identifier,
            method: ServiceMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: ServiceMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialized request body. Only non-GET requests carry one; a missing
    /// body is sent as an empty JSON object.
    pub fn encoded_body(&self) -> Option<String> {
        if self.method == ServiceMethod::Get {
            return None;
        }
        let body = self
            .body
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        Some(body.to_string())
    }
}

/// Raw response: HTTP status and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level failures (no response was obtained).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),
}

/// Sends requests to remote services.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError> {
        debug!(
            service = %request.identifier,
            method = request.method.as_str(),
            url = %request.url,
            "sending request"
        );

        let mut call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .set("Content-Type", "application/json");
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match request.encoded_body() {
            Some(body) => call.send_string(&body),
            None => call.call(),
        };

        let response = match result {
            Ok(response) => response,
            // Non-2xx statuses still carry a body worth handing back.
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => {
                warn!(service = %request.identifier, error = %e, "transport failure");
                return Err(TransportError::Request {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body)?;
        debug!(service = %request.identifier, status, bytes = body.len(), "response received");

        Ok(ServiceResponse { status, body })
    }
}

/// Run a blocking collaborator call off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, LocationError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LocationError::TransportFailure(format!("worker task failed: {}", e)))
}

/// Percent-encode a complete URL for use as a query string.
///
/// Keeps alphanumerics and the URL-query set, which includes `+` and `&` so
/// parameters already present in a configured base URL survive. Every other
/// byte of the UTF-8 encoding becomes `%XX`.
pub fn encode_query_url(s: &str) -> String {
    const QUERY_ALLOWED: &[u8] = b"!$&'()*+,-./:;=?@_~";

    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || QUERY_ALLOWED.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
