//! Mock implementations of the environment traits.
//!
//! Every mock records what the orchestrator asked of it so tests can assert
//! on call order and counts:
//! - [`MockTransport`]: scripted responses per path, records sent endpoints
//! - [`ScriptedExchange`]: scripted credential exchange outcomes
//! - [`MockCredentialStore`]: in-memory tokens, counts resets
//! - [`RecordingEventBus`]: captures published events
//! - [`RecordingResolver`]: captures linked side-tables
//! - [`InlineForeground`]: runs caller jobs immediately

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use ello_core::environment::{
    CachedToken, CredentialExchange, CredentialStore, EventBus, ExchangeOutcome, Foreground, Job,
    LinkedObjectResolver, LinkedObjects, ProviderEvent, TokenSet, Transport, UserCredentials,
};
use ello_core::{AuthState, Endpoint, RawResponse, Transition, TransportError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type TransportResult = Result<RawResponse, TransportError>;

/// Scripted transport.
///
/// Responses are queued per endpoint path. The last scripted response of a
/// path is repeated once its queue is down to one entry. Paths without a
/// script answer 200 with the endpoint's sample response.
///
/// # Example
///
/// ```
/// use ello_testing::mocks::MockTransport;
/// use ello_core::RawResponse;
///
/// let transport = MockTransport::new()
///     .respond("/api/v2/profile", RawResponse::new(401, ""))
///     .respond("/api/v2/profile", RawResponse::new(200, r#"{"users":{"id":"1"}}"#));
/// assert_eq!(transport.request_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Mutex<HashMap<String, VecDeque<TransportResult>>>>,
    requests: Arc<Mutex<Vec<Endpoint>>>,
}

impl MockTransport {
    /// Transport with no scripted responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `path`
    #[must_use]
    pub fn respond(self, path: impl Into<String>, response: RawResponse) -> Self {
        self.push(path.into(), Ok(response));
        self
    }

    /// Queue a transport failure for `path`
    #[must_use]
    pub fn fail(self, path: impl Into<String>, error: TransportError) -> Self {
        self.push(path.into(), Err(error));
        self
    }

    /// Queue a response for `path` on a shared transport
    pub fn push(&self, path: String, result: TransportResult) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path)
            .or_default()
            .push_back(result);
    }

    /// Every endpoint sent so far, in send order
    #[must_use]
    pub fn requests(&self) -> Vec<Endpoint> {
        self.requests.lock().unwrap().clone()
    }

    /// Paths of every endpoint sent so far, in send order
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|endpoint| endpoint.path().to_string())
            .collect()
    }

    /// Number of sends
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of sends of `path`
    #[must_use]
    pub fn count_for(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|endpoint| endpoint.path() == path)
            .count()
    }

    fn next_result(&self, endpoint: &Endpoint) -> TransportResult {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(endpoint.path()) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(RawResponse::default())),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(RawResponse::new(200, endpoint.sample_response()))),
            None => Ok(RawResponse::new(200, endpoint.sample_response())),
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'static, TransportResult> {
        let result = self.next_result(&endpoint);
        self.requests.lock().unwrap().push(endpoint);
        async move { result }.boxed()
    }
}

/// Credential exchange that replays scripted outcomes.
///
/// Outcomes are consumed in order; the last one is repeated. A script-less
/// exchange succeeds.
#[derive(Clone, Default)]
pub struct ScriptedExchange {
    outcomes: Arc<Mutex<VecDeque<ExchangeOutcome>>>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedExchange {
    /// Exchange that always succeeds
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Exchange that replays `outcomes`
    #[must_use]
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = ExchangeOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Exchange that always reports `outcome`
    #[must_use]
    pub fn always(outcome: ExchangeOutcome) -> Self {
        Self::with_outcomes([outcome])
    }

    /// Number of attempts so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl CredentialExchange for ScriptedExchange {
    fn attempt(&self) -> BoxFuture<'static, ExchangeOutcome> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        let outcome = if outcomes.len() > 1 {
            outcomes.pop_front()
        } else {
            outcomes.front().copied()
        }
        .unwrap_or(ExchangeOutcome::Succeeded);
        async move { outcome }.boxed()
    }
}

#[derive(Debug, Default)]
struct StoredCredentials {
    cached: CachedToken,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_credentials: Option<UserCredentials>,
}

/// In-memory credential store that counts resets.
#[derive(Clone, Default)]
pub struct MockCredentialStore {
    inner: Arc<Mutex<StoredCredentials>>,
    resets: Arc<AtomicUsize>,
}

impl MockCredentialStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a token of the given kind
    #[must_use]
    pub fn with_cached(cached: CachedToken) -> Self {
        let store = Self::default();
        if cached != CachedToken::None {
            store.store_token(TokenSet {
                access_token: "cached-access-token".into(),
                refresh_token: Some("cached-refresh-token".into()),
                expires_at: None,
                password_based: cached == CachedToken::PasswordBased,
            });
        }
        store
    }

    /// Number of `reset()` calls
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MockCredentialStore {
    fn cached_token(&self) -> CachedToken {
        self.inner.lock().unwrap().cached
    }

    fn access_token(&self) -> Option<String> {
        self.inner.lock().unwrap().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.inner.lock().unwrap().refresh_token.clone()
    }

    fn user_credentials(&self) -> Option<UserCredentials> {
        self.inner.lock().unwrap().user_credentials.clone()
    }

    fn store_token(&self, tokens: TokenSet) {
        let mut inner = self.inner.lock().unwrap();
        inner.cached = if tokens.password_based {
            CachedToken::PasswordBased
        } else {
            CachedToken::Anonymous
        };
        inner.access_token = Some(tokens.access_token);
        inner.refresh_token = tokens.refresh_token;
    }

    fn save_user_credentials(&self, credentials: UserCredentials) {
        self.inner.lock().unwrap().user_credentials = Some(credentials);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        *self.inner.lock().unwrap() = StoredCredentials::default();
    }
}

/// Event bus that keeps every published event.
#[derive(Clone, Default)]
pub struct RecordingEventBus {
    events: Arc<Mutex<Vec<ProviderEvent>>>,
}

impl RecordingEventBus {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far, in publish order
    #[must_use]
    pub fn events(&self) -> Vec<ProviderEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every published state change, in order
    #[must_use]
    pub fn transitions(&self) -> Vec<Transition> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                ProviderEvent::StateChanged(transition) => Some(*transition),
                _ => None,
            })
            .collect()
    }

    /// Target states of every published state change, in order
    #[must_use]
    pub fn visited_states(&self) -> Vec<AuthState> {
        self.transitions().into_iter().map(|t| t.to).collect()
    }

    /// Number of `ForcedLogout` events
    #[must_use]
    pub fn forced_logouts(&self) -> usize {
        self.count(|event| matches!(event, ProviderEvent::ForcedLogout))
    }

    /// Number of `Deprecated` events
    #[must_use]
    pub fn deprecations(&self) -> usize {
        self.count(|event| matches!(event, ProviderEvent::Deprecated { .. }))
    }

    /// Number of `NetworkFailure` events
    #[must_use]
    pub fn network_failures(&self) -> usize {
        self.count(|event| matches!(event, ProviderEvent::NetworkFailure { .. }))
    }

    /// Number of events matching `predicate`
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ProviderEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl EventBus for RecordingEventBus {
    fn publish(&self, event: ProviderEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Linked-object resolver that keeps every side-table it receives.
#[derive(Clone, Default)]
pub struct RecordingResolver {
    resolved: Arc<Mutex<Vec<LinkedObjects>>>,
}

impl RecordingResolver {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every side-table resolved so far
    #[must_use]
    pub fn resolved(&self) -> Vec<LinkedObjects> {
        self.resolved.lock().unwrap().clone()
    }
}

impl LinkedObjectResolver for RecordingResolver {
    fn resolve(&self, linked: LinkedObjects) -> BoxFuture<'static, ()> {
        let resolved = Arc::clone(&self.resolved);
        async move {
            // Yield once so resolution completes on a later poll than the call.
            tokio::task::yield_now().await;
            resolved.lock().unwrap().push(linked);
        }
        .boxed()
    }
}

/// Foreground that runs every job on the calling task.
#[derive(Clone, Default)]
pub struct InlineForeground {
    delivered: Arc<AtomicUsize>,
}

impl InlineForeground {
    /// New inline foreground
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs delivered
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Foreground for InlineForeground {
    fn deliver(&self, job: Job) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_repeats_last_script() {
        let transport = MockTransport::new()
            .respond("/a", RawResponse::new(401, ""))
            .respond("/a", RawResponse::new(200, "{}"));

        let first = transport.send(Endpoint::get("/a")).await.unwrap();
        let second = transport.send(Endpoint::get("/a")).await.unwrap();
        let third = transport.send(Endpoint::get("/a")).await.unwrap();

        assert_eq!(first.status, 401);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(transport.count_for("/a"), 3);
    }

    #[tokio::test]
    async fn test_transport_serves_sample_response_by_default() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::get("/b").with_sample_response(r#"{"ok":true}"#);

        let response = transport.send(endpoint).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"ok":true}"#.to_vec());
        assert_eq!(transport.paths(), vec!["/b".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_exchange_replays_outcomes() {
        let exchange =
            ScriptedExchange::with_outcomes([ExchangeOutcome::NoNetwork, ExchangeOutcome::Failed]);

        assert_eq!(exchange.attempt().await, ExchangeOutcome::NoNetwork);
        assert_eq!(exchange.attempt().await, ExchangeOutcome::Failed);
        assert_eq!(exchange.attempt().await, ExchangeOutcome::Failed);
        assert_eq!(exchange.attempts(), 3);
    }

    #[test]
    fn test_credential_store_counts_resets() {
        let store = MockCredentialStore::with_cached(CachedToken::PasswordBased);
        assert_eq!(store.cached_token(), CachedToken::PasswordBased);

        store.reset();

        assert_eq!(store.cached_token(), CachedToken::None);
        assert_eq!(store.access_token(), None);
        assert_eq!(store.reset_count(), 1);
    }

    #[test]
    fn test_inline_foreground_runs_immediately() {
        let foreground = InlineForeground::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        foreground.deliver(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(foreground.delivered(), 1);
    }
}
