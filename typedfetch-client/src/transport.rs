//! HTTP transport seam and its reqwest implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Parameter payload for a single request.
///
/// Placed as query parameters for GET and as a JSON object body for POST.
pub type Params = Map<String, Value>;

/// User agent string sent with every request.
const USER_AGENT: &str = concat!("typedfetch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Method
// ============================================================================

/// HTTP method used by a fetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET; parameters travel in the query string.
    Get,
    /// POST; parameters travel as a JSON body.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

// ============================================================================
// Transport Error
// ============================================================================

/// A classified transport-level failure.
///
/// Every variant is transient: the retry loop sleeps the current backoff and
/// retries it, unless it occurs on the final attempt, where it is promoted
/// to [`crate::FetchError::Fatal`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection dropped mid-exchange.
    #[error("connection reset: {0}")]
    Reset(String),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The exchange violated the protocol or the request could not be built.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The upstream answered outside the 2xx range.
    #[error("unexpected status {status}")]
    Status {
        /// The HTTP status code returned by the upstream.
        status: u16,
    },
}

// ============================================================================
// Transport Trait
// ============================================================================

/// One-shot HTTP exchange used by the fetcher.
///
/// Implementations perform exactly one request per [`Transport::send`] call
/// and release all connection state before returning, on every exit path.
/// Attempts within one fetch call are sequential, so a transport is never
/// asked to overlap requests for the same logical call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns the response body on a 2xx status.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`] for timeouts, connection
    /// failures, protocol errors, and non-2xx statuses.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
        params: &Params,
    ) -> Result<Vec<u8>, TransportError>;
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// Production transport over reqwest.
///
/// A fresh [`reqwest::Client`] is built for every attempt and dropped before
/// the next one, so a poisoned connection cannot taint retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
        params: &Params,
    ) -> Result<Vec<u8>, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers.clone())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let request = match method {
            Method::Get => client.get(url).query(params),
            Method::Post => client.post(url).json(params),
        };

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        debug!(url = %url, status = %status, "response received");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}

/// Maps a reqwest error onto the transport failure taxonomy.
fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_body() {
        TransportError::Reset(error.to_string())
    } else {
        TransportError::Protocol(error.to_string())
    }
}
