//! Fetch error types.

use thiserror::Error;
use typedfetch_core::ValidationError;

use crate::transport::TransportError;

// ============================================================================
// Rejection
// ============================================================================

/// The last rejection recorded before the attempt budget ran out.
///
/// Attached to [`FetchError::RetriesExhausted`] so callers can tell a
/// persistently malformed upstream from a persistently schema-invalid one
/// without digging through logs.
#[derive(Debug, Clone, Error)]
pub enum Rejection {
    /// The response body was not well-formed JSON.
    #[error("malformed response body: {0}")]
    Decode(String),

    /// The decoded body did not match the expected schema.
    #[error("schema mismatch: {0}")]
    Validation(#[from] ValidationError),
}

// ============================================================================
// Fetch Error
// ============================================================================

/// Error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The base URL was empty or not an absolute URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// A transport failure on the final permitted attempt.
    #[error("request failed after {attempts} attempts: {source}")]
    Fatal {
        /// Attempts performed, the failing one included.
        attempts: u32,
        /// The transport failure that spent the budget.
        #[source]
        source: TransportError,
    },

    /// Every attempt was consumed without a validated response.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts performed.
        attempts: u32,
        /// The last decode or validation rejection, if any attempt got far
        /// enough to record one.
        last: Option<Rejection>,
    },

    /// The call was aborted through its cancellation token.
    #[error("fetch cancelled")]
    Cancelled,
}
