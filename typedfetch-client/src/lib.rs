// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `typedfetch` Client
//!
//! Typed HTTP fetching with retry and exponential backoff.
//!
//! A [`TypedFetcher`] owns a base URL, headers, a timeout, and a
//! [`RetryPolicy`]. Each `fetch` (GET) or `submit` (POST) call issues
//! sequential attempts until the response body decodes and validates
//! against the schema type `T`:
//!
//! - transport failures (timeout, connection reset/refused, protocol error,
//!   non-2xx status) sleep the current backoff, double it, and retry;
//! - decode and validation failures retry immediately without sleeping but
//!   still consume an attempt;
//! - the call ends in a validated `T`, a [`FetchError::Fatal`] (transport
//!   failure on the final attempt), or [`FetchError::RetriesExhausted`]
//!   carrying the last rejection.
//!
//! ## Modules
//!
//! - [`fetcher`] - [`TypedFetcher`], the retry loop, per-attempt [`Outcome`]
//! - [`retry`] - [`RetryPolicy`] and call-scoped [`RetryState`]
//! - [`transport`] - the [`Transport`] seam and its reqwest implementation
//! - [`report`] - the [`Reporter`] logging collaborator
//! - [`error`] - the terminal error taxonomy
//!
//! ## Example
//!
//! ```ignore
//! use typedfetch_client::TypedFetcher;
//!
//! #[derive(serde::Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let fetcher: TypedFetcher<User> = TypedFetcher::new("https://api.test")?;
//! let user = fetcher.fetch("/users", params).await?;
//! ```

pub mod error;
pub mod fetcher;
pub mod report;
pub mod retry;
pub mod transport;

// Errors
pub use error::{FetchError, Rejection};

// Fetcher
pub use fetcher::{FetchRequest, Outcome, TypedFetcher};

// Collaborator seams
pub use report::{Reporter, TracingReporter};
pub use transport::{HttpTransport, Method, Params, Transport, TransportError};

// Retry policy
pub use retry::{RetryPolicy, RetryState};

// Re-export the validation contract for downstream schema types
pub use typedfetch_core::{FieldIssue, Validatable, ValidationError};
