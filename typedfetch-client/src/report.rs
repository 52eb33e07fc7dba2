//! The logging collaborator seam.

use tracing::{debug, error, info, warn};

/// Fire-and-forget logging collaborator for the fetcher.
///
/// Implementations must not block the retry loop and must not fail; every
/// method is infallible and synchronous.
pub trait Reporter: Send + Sync {
    /// Routine per-attempt detail.
    fn debug(&self, msg: &str);
    /// A transient failure that will be retried.
    fn warning(&self, msg: &str);
    /// A rejection or a terminal failure.
    fn error(&self, msg: &str);
    /// A validated success, at elevated visibility.
    fn success(&self, msg: &str);
}

/// Default reporter forwarding to the `tracing` macros.
///
/// `tracing` has no dedicated success level, so successes are emitted at
/// info with an `outcome = "success"` field for subscribers that want to
/// style them apart from ordinary info events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn debug(&self, msg: &str) {
        debug!(target: "typedfetch", "{msg}");
    }

    fn warning(&self, msg: &str) {
        warn!(target: "typedfetch", "{msg}");
    }

    fn error(&self, msg: &str) {
        error!(target: "typedfetch", "{msg}");
    }

    fn success(&self, msg: &str) {
        info!(target: "typedfetch", outcome = "success", "{msg}");
    }
}
