//! The typed fetcher and its retry loop.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use typedfetch_core::{Validatable, ValidationError};
use url::Url;

use crate::error::{FetchError, Rejection};
use crate::report::{Reporter, TracingReporter};
use crate::retry::{RetryPolicy, RetryState};
use crate::transport::{HttpTransport, Method, Params, Transport, TransportError};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Fetch Request
// ============================================================================

/// A single fetch request, immutable across the attempts of one call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Path appended to the fetcher's base URL.
    pub endpoint: String,
    /// Parameters, placed per method (query string for GET, JSON body for
    /// POST).
    pub params: Params,
    /// HTTP method.
    pub method: Method,
}

// ============================================================================
// Outcome
// ============================================================================

/// Classification of a single attempt.
///
/// Produced once per attempt and consumed by the retry loop, which decides
/// whether to continue, sleep, or stop. Terminal promotions (fatal transport
/// failure on the final attempt, exhausted budget) are expressed through
/// [`FetchError`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// The body decoded and validated.
    Success(T),
    /// The body decoded but did not match the schema; retried without
    /// backoff.
    ValidationFailed(ValidationError),
    /// The body was not well-formed JSON; retried without backoff.
    DecodeFailed(String),
    /// A classified transport failure; retried after the current backoff.
    TransientError(TransportError),
    /// The cancellation token fired mid-attempt.
    Cancelled,
}

// ============================================================================
// Typed Fetcher
// ============================================================================

/// Typed HTTP-fetching client with retry and exponential backoff.
///
/// Parameterized by a response schema type `T`. A call either returns a
/// validated `T` or one terminal [`FetchError`]; no partial value is ever
/// produced. All configuration is immutable after construction, and all
/// per-call retry state lives on the call's own stack frame, so concurrent
/// calls on one instance need no locking.
///
/// ```ignore
/// let fetcher: TypedFetcher<User> = TypedFetcher::new("https://api.test")?;
/// let user = fetcher.fetch("/users", params).await?;
/// ```
pub struct TypedFetcher<T> {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn Reporter>,
    _schema: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            policy: self.policy.clone(),
            transport: Arc::clone(&self.transport),
            reporter: Arc::clone(&self.reporter),
            _schema: PhantomData,
        }
    }
}

impl<T: Validatable> TypedFetcher<T> {
    /// Creates a fetcher for the given base URL with default settings:
    /// empty headers, 30 s timeout, 5 attempts, 1 s initial backoff.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidBaseUrl`] when the base URL is empty or
    /// not an absolute URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(FetchError::InvalidBaseUrl(
                "base URL must not be empty".to_string(),
            ));
        }
        Url::parse(&base_url)
            .map_err(|e| FetchError::InvalidBaseUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            base_url,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            policy: RetryPolicy::default(),
            transport: Arc::new(HttpTransport),
            reporter: Arc::new(TracingReporter),
            _schema: PhantomData,
        })
    }

    /// Sets the headers sent with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the logging collaborator.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the transport. Used by tests and by callers that need a
    /// non-reqwest exchange.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// GET `endpoint` with `params` serialized as query parameters.
    ///
    /// # Errors
    ///
    /// See [`FetchError`] for the terminal failure taxonomy.
    pub async fn fetch(&self, endpoint: &str, params: Params) -> Result<T, FetchError> {
        self.execute(Self::request(endpoint, params, Method::Get), None)
            .await
    }

    /// POST `endpoint` with `params` serialized as a JSON body.
    ///
    /// # Errors
    ///
    /// See [`FetchError`] for the terminal failure taxonomy.
    pub async fn submit(&self, endpoint: &str, params: Params) -> Result<T, FetchError> {
        self.execute(Self::request(endpoint, params, Method::Post), None)
            .await
    }

    /// Like [`TypedFetcher::fetch`], abortable through `cancel`.
    ///
    /// If the token fires during a backoff sleep or an in-flight request the
    /// current attempt is dropped and the call returns
    /// [`FetchError::Cancelled`].
    ///
    /// # Errors
    ///
    /// See [`FetchError`] for the terminal failure taxonomy.
    pub async fn fetch_with_cancel(
        &self,
        endpoint: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        self.execute(Self::request(endpoint, params, Method::Get), Some(cancel))
            .await
    }

    /// Like [`TypedFetcher::submit`], abortable through `cancel`.
    ///
    /// # Errors
    ///
    /// See [`FetchError`] for the terminal failure taxonomy.
    pub async fn submit_with_cancel(
        &self,
        endpoint: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        self.execute(Self::request(endpoint, params, Method::Post), Some(cancel))
            .await
    }

    fn request(endpoint: &str, params: Params, method: Method) -> FetchRequest {
        FetchRequest {
            endpoint: endpoint.to_string(),
            params,
            method,
        }
    }

    /// Runs the retry loop for one request.
    ///
    /// Transport failures sleep the current backoff (doubling each time)
    /// before the next attempt; decode and validation rejections consume an
    /// attempt without sleeping. A fresh [`RetryState`] is created here on
    /// every call.
    #[instrument(skip_all, fields(method = %request.method, endpoint = %request.endpoint))]
    async fn execute(
        &self,
        request: FetchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, request.endpoint);
        let params_view = Value::Object(request.params.clone()).to_string();
        let mut state = RetryState::new(&self.policy);
        let mut last: Option<Rejection> = None;

        while !state.exhausted() {
            self.reporter.debug(&format!(
                "{} {} params={params_view}",
                request.method, url
            ));

            match self.attempt(&request, &url, cancel).await {
                Outcome::Success(value) => {
                    self.reporter.success(&format!(
                        "fetched {} params={params_view}",
                        request.endpoint
                    ));
                    return Ok(value);
                }
                Outcome::Cancelled => return Err(FetchError::Cancelled),
                Outcome::ValidationFailed(err) => {
                    self.reporter
                        .error(&format!("endpoint {}: {err}", request.endpoint));
                    last = Some(Rejection::Validation(err));
                    self.rejection_pause(cancel).await?;
                }
                Outcome::DecodeFailed(reason) => {
                    self.reporter.error(&format!(
                        "endpoint {}: malformed response body: {reason}",
                        request.endpoint
                    ));
                    last = Some(Rejection::Decode(reason));
                    self.rejection_pause(cancel).await?;
                }
                Outcome::TransientError(err) => {
                    if state.on_final_attempt() {
                        self.reporter.error(&format!(
                            "request failed: {err}; endpoint: {}; params: {params_view}; \
                             retries exceeded",
                            request.endpoint
                        ));
                        return Err(FetchError::Fatal {
                            attempts: state.attempt() + 1,
                            source: err,
                        });
                    }
                    self.reporter.warning(&format!(
                        "request failed: {err}; endpoint: {}; params: {params_view}; retrying",
                        request.endpoint
                    ));
                    let delay = state.backoff_and_double();
                    self.pause(delay, cancel).await?;
                }
            }

            state.advance();
        }

        self.reporter.error(&format!(
            "retries exhausted for {}; params: {params_view}",
            request.endpoint
        ));
        Err(FetchError::RetriesExhausted {
            attempts: state.attempt(),
            last,
        })
    }

    /// Issues one attempt and classifies its result.
    async fn attempt(
        &self,
        request: &FetchRequest,
        url: &str,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<T> {
        let sent = self.transport.send(
            request.method,
            url,
            &self.headers,
            self.timeout,
            &request.params,
        );

        let body = match cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => return Outcome::Cancelled,
                result = sent => result,
            },
            None => sent.await,
        };

        let body = match body {
            Ok(body) => body,
            Err(err) => return Outcome::TransientError(err),
        };

        let raw: Value = match serde_json::from_slice(&body) {
            Ok(raw) => raw,
            Err(err) => return Outcome::DecodeFailed(err.to_string()),
        };

        match T::validate(raw) {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::ValidationFailed(err),
        }
    }

    /// Sleeps between attempts, aborting promptly on cancellation.
    async fn pause(
        &self,
        delay: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), FetchError> {
        match cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => Err(FetchError::Cancelled),
                () = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    /// Optional pause after a decode/validation rejection. The default
    /// policy re-requests immediately.
    async fn rejection_pause(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), FetchError> {
        match self.policy.rejection_delay {
            Some(delay) => self.pause(delay, cancel).await,
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn ok_body() -> Vec<u8> {
        br#"{"id":7,"name":"Ann"}"#.to_vec()
    }

    fn invalid_body() -> Vec<u8> {
        br#"{"id":"not-a-number"}"#.to_vec()
    }

    /// Transport that replays a fixed script of responses.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Vec<u8>, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _method: Method,
            _url: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
            _params: &Params,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    /// Transport that returns the same response forever.
    struct FixedTransport {
        response: Result<Vec<u8>, TransportError>,
        calls: AtomicU32,
    }

    impl FixedTransport {
        fn new(response: Result<Vec<u8>, TransportError>) -> Self {
            Self {
                response,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(
            &self,
            _method: Method,
            _url: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
            _params: &Params,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    /// Transport whose request never completes.
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn send(
            &self,
            _method: Method,
            _url: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
            _params: &Params,
        ) -> Result<Vec<u8>, TransportError> {
            std::future::pending().await
        }
    }

    /// Reporter that records every message for assertions.
    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingReporter {
        fn count(&self, level: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .count()
        }
    }

    impl Reporter for RecordingReporter {
        fn debug(&self, msg: &str) {
            self.events.lock().unwrap().push(("debug", msg.to_string()));
        }
        fn warning(&self, msg: &str) {
            self.events.lock().unwrap().push(("warning", msg.to_string()));
        }
        fn error(&self, msg: &str) {
            self.events.lock().unwrap().push(("error", msg.to_string()));
        }
        fn success(&self, msg: &str) {
            self.events.lock().unwrap().push(("success", msg.to_string()));
        }
    }

    fn fetcher(transport: Arc<dyn Transport>) -> TypedFetcher<User> {
        TypedFetcher::new("https://api.test")
            .unwrap()
            .with_transport(transport)
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_makes_one_call_and_no_sleep() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ok_body())]));
        let reporter = Arc::new(RecordingReporter::default());
        let fetcher = fetcher(transport.clone()).with_reporter(reporter.clone());

        let start = Instant::now();
        let user = fetcher.fetch("/users", params(json!({"id": 7}))).await.unwrap();

        assert_eq!(
            user,
            User {
                id: 7,
                name: "Ann".to_string()
            }
        );
        assert_eq!(transport.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(reporter.count("success"), 1);
        assert_eq!(reporter.count("warning"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_succeed() {
        // The worked scenario: 500 on attempts 1-2, then a valid body.
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Status { status: 500 }),
            Err(TransportError::Status { status: 500 }),
            Ok(ok_body()),
        ]));
        let reporter = Arc::new(RecordingReporter::default());
        let fetcher = fetcher(transport.clone()).with_reporter(reporter.clone());

        let start = Instant::now();
        let user = fetcher.fetch("/users", params(json!({"id": 7}))).await.unwrap();

        assert_eq!(user.name, "Ann");
        assert_eq!(transport.calls(), 3);
        // Sleeps of 1 s then 2 s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(reporter.count("warning"), 2);
        assert_eq!(reporter.count("success"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transport_failure_is_fatal() {
        let transport = Arc::new(FixedTransport::new(Err(TransportError::Timeout)));
        let fetcher = fetcher(transport.clone());

        let start = Instant::now();
        let err = fetcher.fetch("/users", Params::new()).await.unwrap_err();

        let FetchError::Fatal { attempts, source } = err else {
            panic!("expected Fatal, got {err:?}");
        };
        assert_eq!(attempts, 5);
        assert!(matches!(source, TransportError::Timeout));
        assert_eq!(transport.calls(), 5);
        // Four sleeps: 1 + 2 + 4 + 8 seconds.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_schema_mismatch_exhausts_without_sleeping() {
        let transport = Arc::new(FixedTransport::new(Ok(invalid_body())));
        let fetcher = fetcher(transport.clone());

        let start = Instant::now();
        let err = fetcher.fetch("/users", params(json!({"id": 7}))).await.unwrap_err();

        let FetchError::RetriesExhausted { attempts, last } = err else {
            panic!("expected RetriesExhausted, got {err:?}");
        };
        assert_eq!(attempts, 5);
        assert!(matches!(last, Some(Rejection::Validation(_))));
        assert_eq!(transport.calls(), 5);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_recorded_as_decode_rejection() {
        let transport = Arc::new(FixedTransport::new(Ok(b"not json".to_vec())));
        let fetcher = fetcher(transport.clone());

        let err = fetcher.fetch("/users", Params::new()).await.unwrap_err();

        let FetchError::RetriesExhausted { last, .. } = err else {
            panic!("expected RetriesExhausted, got {err:?}");
        };
        assert!(matches!(last, Some(Rejection::Decode(_))));
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_and_validation_failures_interleave() {
        // One transient failure (sleeps 1 s), one schema-invalid body (no
        // sleep), then success.
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connect("refused".to_string())),
            Ok(invalid_body()),
            Ok(ok_body()),
        ]));
        let fetcher = fetcher(transport.clone());

        let start = Instant::now();
        let user = fetcher.submit("/users", Params::new()).await.unwrap();

        assert_eq!(user.id, 7);
        assert_eq!(transport.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_delay_paces_schema_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(invalid_body()),
            Ok(ok_body()),
        ]));
        let fetcher = fetcher(transport.clone()).with_policy(
            RetryPolicy::default().with_rejection_delay(Duration::from_millis(500)),
        );

        let start = Instant::now();
        fetcher.fetch("/users", Params::new()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_aborts_in_flight_attempt() {
        let fetcher = fetcher(Arc::new(HangingTransport));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher
            .fetch_with_cancel("/users", Params::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_is_not_exhaustion() {
        let transport = Arc::new(FixedTransport::new(Err(TransportError::Timeout)));
        let fetcher = fetcher(transport).with_policy(
            RetryPolicy::default().with_initial_backoff(Duration::from_secs(3600)),
        );
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                fetcher
                    .fetch_with_cancel("/users", Params::new(), &cancel)
                    .await
            })
        };

        // Let the call reach its backoff sleep, then fire the token.
        tokio::task::yield_now().await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test]
    async fn repeated_calls_classify_identically() {
        let transport = Arc::new(FixedTransport::new(Ok(invalid_body())));
        let fetcher = fetcher(transport.clone())
            .with_policy(RetryPolicy::new(2));

        let first = fetcher.fetch("/users", params(json!({"id": 7}))).await;
        let second = fetcher.fetch("/users", params(json!({"id": 7}))).await;

        for result in [first, second] {
            let err = result.unwrap_err();
            assert!(matches!(
                err,
                FetchError::RetriesExhausted {
                    attempts: 2,
                    last: Some(Rejection::Validation(_)),
                }
            ));
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn zero_attempt_policy_returns_exhausted_without_a_request() {
        let transport = Arc::new(FixedTransport::new(Ok(ok_body())));
        let fetcher = fetcher(transport.clone()).with_policy(RetryPolicy::new(0));

        let err = fetcher.fetch("/users", Params::new()).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::RetriesExhausted {
                attempts: 0,
                last: None,
            }
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let result: Result<TypedFetcher<User>, _> = TypedFetcher::new("");
        assert!(matches!(result, Err(FetchError::InvalidBaseUrl(_))));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let result: Result<TypedFetcher<User>, _> = TypedFetcher::new("api.test/v1");
        assert!(matches!(result, Err(FetchError::InvalidBaseUrl(_))));
    }
}
