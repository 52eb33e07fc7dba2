//! Retry policy and per-call retry state.

use std::time::Duration;

/// Default maximum number of attempts per call.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff before the first retry.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// ============================================================================
// Retry Policy
// ============================================================================

/// Policy for retrying failed requests.
///
/// Transport failures sleep the current backoff before the next attempt and
/// the backoff doubles each time, without a cap and without jitter. Decode
/// and validation rejections consume an attempt but re-request immediately
/// unless [`RetryPolicy::rejection_delay`] is set.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the initial request included.
    pub max_attempts: u32,
    /// Backoff before the first retry of a transport failure.
    pub initial_backoff: Duration,
    /// Optional pause before re-requesting after a decode or validation
    /// rejection. `None` re-requests immediately; an upstream that keeps
    /// answering 200 with a schema-invalid body is otherwise hammered
    /// without any delay.
    pub rejection_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and default backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            rejection_delay: None,
        }
    }

    /// Disables retries: one attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            rejection_delay: None,
        }
    }

    /// Sets the backoff before the first retry.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets a pause before re-requesting after a rejection.
    pub fn with_rejection_delay(mut self, delay: Duration) -> Self {
        self.rejection_delay = Some(delay);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

// ============================================================================
// Retry State
// ============================================================================

/// Mutable retry bookkeeping for one call.
///
/// Created fresh on every `fetch`/`submit` invocation and dropped on return.
/// It is never stored on the fetcher, so concurrent or sequential calls on
/// the same instance cannot observe each other's inflated backoff.
#[derive(Debug)]
pub struct RetryState {
    attempt: u32,
    backoff: Duration,
    max_attempts: u32,
}

impl RetryState {
    /// Creates fresh state from a policy.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            backoff: policy.initial_backoff,
            max_attempts: policy.max_attempts,
        }
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True once the attempt budget is spent.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// True while the current attempt is the last permitted one.
    pub fn on_final_attempt(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }

    /// Returns the backoff to sleep now and doubles it for the next
    /// transient failure.
    pub fn backoff_and_double(&mut self) -> Duration {
        let current = self.backoff;
        self.backoff = self.backoff.saturating_mul(2);
        current
    }

    /// Marks the current attempt as consumed.
    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}
