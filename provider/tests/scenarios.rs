//! End-to-end scenarios for the provider, driven through the store with
//! scripted collaborators and paused time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use ello_core::environment::{CachedToken, CredentialExchange, ExchangeOutcome};
use ello_core::{
    AuthState, Endpoint, MappingType, NetworkRoute, Payload, ProviderError, RawResponse, TokenRequirement,
    Transition, TransportError,
};
use ello_provider::{ElloProvider, ProviderConfig, TransitionPolicy};
use ello_testing::helpers::init_tracing;
use ello_testing::{
    InlineForeground, MockCredentialStore, MockTransport, RecordingEventBus, RecordingResolver,
    ScriptedExchange,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Fixture {
    provider: ElloProvider,
    transport: MockTransport,
    credentials: MockCredentialStore,
    events: RecordingEventBus,
    resolver: RecordingResolver,
    anonymous: ScriptedExchange,
    refresh: ScriptedExchange,
    user: ScriptedExchange,
}

struct FixtureBuilder {
    transport: MockTransport,
    cached: CachedToken,
    initial_state: AuthState,
    anonymous: ScriptedExchange,
    refresh: ScriptedExchange,
    user: ScriptedExchange,
    policy: TransitionPolicy,
}

impl FixtureBuilder {
    fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            cached: CachedToken::None,
            initial_state: AuthState::Initial,
            anonymous: ScriptedExchange::succeeding(),
            refresh: ScriptedExchange::succeeding(),
            user: ScriptedExchange::succeeding(),
            policy: TransitionPolicy::Flag,
        }
    }

    fn cached(mut self, cached: CachedToken) -> Self {
        self.cached = cached;
        self
    }

    fn starting_in(mut self, state: AuthState) -> Self {
        self.initial_state = state;
        self
    }

    fn refresh(mut self, refresh: ScriptedExchange) -> Self {
        self.refresh = refresh;
        self
    }

    fn policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build(self) -> Fixture {
        init_tracing();

        let credentials = MockCredentialStore::with_cached(self.cached);
        let events = RecordingEventBus::new();
        let resolver = RecordingResolver::new();

        let provider = ElloProvider::builder()
            .config(ProviderConfig::default().with_transition_policy(self.policy))
            .transport(self.transport.clone())
            .anonymous_exchange(self.anonymous.clone())
            .refresh_exchange(self.refresh.clone())
            .user_exchange(self.user.clone())
            .credentials(credentials.clone())
            .resolver(resolver.clone())
            .events(events.clone())
            .foreground(InlineForeground::new())
            .initial_state(self.initial_state)
            .build()
            .expect("provider builds");

        Fixture {
            provider,
            transport: self.transport,
            credentials,
            events,
            resolver,
            anonymous: self.anonymous,
            refresh: self.refresh,
            user: self.user,
        }
    }
}

fn profile() -> Endpoint {
    Endpoint::get("/api/v2/profile")
        .with_token_requirement(TokenRequirement::User)
        .with_mapping(MappingType::node("users"))
}

fn categories(path: &str) -> Endpoint {
    Endpoint::get(path)
        .with_token_requirement(TokenRequirement::Anonymous)
        .with_mapping(MappingType::node("categories"))
}

/// Exchange that succeeds only after `delay`.
#[derive(Clone)]
struct SlowExchange(Duration);

impl CredentialExchange for SlowExchange {
    fn attempt(&self) -> BoxFuture<'static, ExchangeOutcome> {
        let delay = self.0;
        async move {
            tokio::time::sleep(delay).await;
            ExchangeOutcome::Succeeded
        }
        .boxed()
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cached_password_token_authenticates_without_exchanges() {
    let transport = MockTransport::new().respond(
        "/api/v2/profile",
        RawResponse::new(200, r#"{"users":{"id":"42","username":"ello"}}"#),
    );
    let f = FixtureBuilder::new(transport)
        .cached(CachedToken::PasswordBased)
        .build();

    let response = f.provider.request(profile()).await.unwrap();

    assert_eq!(
        response.payload,
        Payload::One(json!({"id": "42", "username": "ello"}))
    );
    assert_eq!(f.provider.auth_state().await, AuthState::Authenticated);
    assert_eq!(
        f.events.transitions(),
        vec![Transition::new(AuthState::Initial, AuthState::Authenticated)]
    );
    assert_eq!(f.anonymous.attempts() + f.refresh.attempts() + f.user.attempts(), 0);
    assert_eq!(f.transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_request_is_refreshed_and_resent() {
    let transport = MockTransport::new()
        .respond("/api/v2/profile", RawResponse::new(401, ""))
        .respond("/api/v2/profile", RawResponse::new(200, r#"{"users":{"id":"42"}}"#));
    let f = FixtureBuilder::new(transport)
        .cached(CachedToken::PasswordBased)
        .starting_in(AuthState::Authenticated)
        .build();

    let response = f.provider.request(profile()).await.unwrap();

    assert_eq!(response.payload, Payload::One(json!({"id": "42"})));
    assert_eq!(f.refresh.attempts(), 1);
    assert_eq!(f.transport.count_for("/api/v2/profile"), 2);
    assert_eq!(f.provider.auth_state().await, AuthState::Authenticated);
    assert_eq!(f.provider.generation().await.value(), 1);
    assert_eq!(
        f.events.visited_states(),
        vec![AuthState::RefreshTokenSent, AuthState::Authenticated]
    );
    assert!(f.provider.violations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_requests_queued_during_anonymous_auth_are_sent_in_order() {
    let f = FixtureBuilder::new(MockTransport::new()).build();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for path in ["/api/v2/a", "/api/v2/b", "/api/v2/c"] {
        let ok = tx.clone();
        let err = tx.clone();
        f.provider
            .dispatch(
                Endpoint::get(path).with_token_requirement(TokenRequirement::Anonymous),
                move |_| {
                    let _ = ok.send(Ok(()));
                },
                move |error, _| {
                    let _ = err.send(Err(error));
                },
            )
            .await
            .unwrap();
    }

    assert_eq!(f.provider.auth_state().await, AuthState::ShouldTryAnonymousCreds);
    assert_eq!(f.provider.waiting().await, 3);
    assert_eq!(f.transport.request_count(), 0);

    for _ in 0..3 {
        assert_eq!(rx.recv().await.unwrap(), Ok(()));
    }

    assert_eq!(
        f.transport.paths(),
        vec!["/api/v2/a".to_string(), "/api/v2/b".to_string(), "/api/v2/c".to_string()]
    );
    assert_eq!(f.provider.auth_state().await, AuthState::Anonymous);
    assert_eq!(f.provider.waiting().await, 0);
    assert_eq!(f.anonymous.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_content_succeeds_with_empty_payload() {
    let transport = MockTransport::new().respond("/api/v2/posts/1", RawResponse::new(204, ""));
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Authenticated)
        .build();

    let response = f
        .provider
        .request(Endpoint::delete("/api/v2/posts/1"))
        .await
        .unwrap();

    assert_eq!(response.payload, Payload::Empty);
    assert_eq!(response.config.status_code, Some(204));
}

#[tokio::test(start_paused = true)]
async fn test_gone_endpoint_notifies_once_and_never_calls_back() {
    let transport = MockTransport::new().respond(
        "/api/v1/old",
        RawResponse::new(410, r#"{"errors":{"title":"Upgrade required"}}"#),
    );
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Authenticated)
        .build();

    let result = f.provider.request(Endpoint::get("/api/v1/old")).await;

    assert_eq!(result, Err(ProviderError::Dropped));
    assert_eq!(f.events.deprecations(), 1);
    assert_eq!(f.transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_without_network_keeps_retrying_without_logging_out() {
    let transport = MockTransport::new()
        .respond("/api/v2/profile", RawResponse::new(401, ""))
        .respond("/api/v2/profile", RawResponse::new(200, r#"{"users":{"id":"42"}}"#));
    let refresh = ScriptedExchange::with_outcomes([
        ExchangeOutcome::NoNetwork,
        ExchangeOutcome::NoNetwork,
        ExchangeOutcome::NoNetwork,
        ExchangeOutcome::Succeeded,
    ]);
    let f = FixtureBuilder::new(transport)
        .cached(CachedToken::PasswordBased)
        .starting_in(AuthState::Authenticated)
        .refresh(refresh)
        .build();

    let provider = f.provider.clone();
    let pending = tokio::spawn(async move { provider.request(profile()).await });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(matches!(
        f.provider.auth_state().await,
        AuthState::ShouldTryRefreshToken | AuthState::RefreshTokenSent
    ));
    assert_eq!(f.provider.waiting().await, 1);

    let response = pending.await.unwrap().unwrap();

    assert_eq!(response.payload, Payload::One(json!({"id": "42"})));
    assert_eq!(f.refresh.attempts(), 4);
    let visited = f.events.visited_states();
    assert!(!visited.contains(&AuthState::NoToken));
    assert_eq!(
        visited
            .iter()
            .filter(|state| **state == AuthState::ShouldTryRefreshToken)
            .count(),
        3
    );
    assert_eq!(f.credentials.reset_count(), 0);
    assert!(f.provider.violations().await.is_empty());
}

// ============================================================================
// Supplements
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_twice_resets_and_notifies_once() {
    let f = FixtureBuilder::new(MockTransport::new())
        .cached(CachedToken::PasswordBased)
        .starting_in(AuthState::Authenticated)
        .build();

    f.provider.logout().await.unwrap();
    f.provider.logout().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(f.provider.auth_state().await, AuthState::NoToken);
    assert_eq!(f.credentials.reset_count(), 1);
    assert_eq!(f.events.forced_logouts(), 1);
    assert!(f.events.events().iter().any(|event| matches!(
        event,
        ello_core::environment::ProviderEvent::NetworkFailure {
            status: Some(401),
            ..
        }
    )));
    assert_eq!(f.events.network_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_request_after_logout_fails_with_401() {
    let f = FixtureBuilder::new(MockTransport::new())
        .starting_in(AuthState::NoToken)
        .build();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ok = tx.clone();

    f.provider
        .dispatch(
            profile(),
            move |_| {
                let _ = ok.send(None);
            },
            move |error, status| {
                let _ = tx.send(Some((error, status)));
            },
        )
        .await
        .unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        Some((ProviderError::Unauthenticated, Some(401)))
    );
    assert_eq!(f.transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_linked_objects_are_resolved_before_the_callback() {
    let transport = MockTransport::new().respond(
        "/api/v2/categories",
        RawResponse::new(
            200,
            r#"{"categories":[{"id":"1"}],"linked":{"users":[{"id":"9"}]}}"#,
        ),
    );
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Anonymous)
        .build();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let resolver = f.resolver.clone();

    f.provider
        .dispatch(
            categories("/api/v2/categories"),
            move |response| {
                let _ = tx.send((resolver.resolved().len(), response.payload));
            },
            |error, _| panic!("unexpected failure: {error}"),
        )
        .await
        .unwrap();

    let (resolved, payload) = rx.recv().await.unwrap();
    assert_eq!(resolved, 1);
    assert_eq!(payload, Payload::Many(vec![json!({"id": "1"})]));
    assert_eq!(f.resolver.resolved()[0]["users"], vec![json!({"id": "9"})]);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_envelope_reaches_the_caller() {
    let transport = MockTransport::new().respond(
        "/api/v2/signup",
        RawResponse::new(
            422,
            r#"{"errors":{"code":"invalid","title":"Invalid","attrs":{"email":["is taken"]}}}"#,
        ),
    );
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Anonymous)
        .build();

    let error = f
        .provider
        .request(Endpoint::post("/api/v2/signup").with_token_requirement(TokenRequirement::Anonymous))
        .await
        .unwrap_err();

    let ProviderError::Server(server) = &error else {
        panic!("expected server error, got {error:?}");
    };
    assert_eq!(error.status(), Some(422));
    assert_eq!(server.code.as_deref(), Some("invalid"));
    assert_eq!(server.attrs["email"], vec!["is taken".to_string()]);
    assert!(f.events.events().iter().all(|event| !matches!(
        event,
        ello_core::environment::ProviderEvent::Deprecated { .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_is_retried_and_reported() {
    let transport = MockTransport::new()
        .fail("/api/v2/categories", TransportError::Connect("refused".into()))
        .respond("/api/v2/categories", RawResponse::new(200, r#"{"categories":[]}"#));
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Anonymous)
        .build();

    let response = f
        .provider
        .request(categories("/api/v2/categories"))
        .await
        .unwrap();

    assert_eq!(response.payload, Payload::Many(Vec::new()));
    assert_eq!(f.transport.count_for("/api/v2/categories"), 2);
    assert_eq!(f.events.network_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_via_secondary_route_reaches_the_transport() {
    let transport = MockTransport::new()
        .respond("/api/v2/categories", RawResponse::new(200, r#"{"categories":[]}"#));
    let f = FixtureBuilder::new(transport)
        .starting_in(AuthState::Anonymous)
        .build();

    let response = f
        .provider
        .request_via(categories("/api/v2/categories"), NetworkRoute::Secondary)
        .await
        .unwrap();

    assert_eq!(response.payload, Payload::Many(Vec::new()));
    let sent = f.transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].route(), NetworkRoute::Secondary);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_result_after_logout_is_ignored() {
    let transport = MockTransport::new().respond("/api/v2/profile", RawResponse::new(401, ""));
    let credentials = MockCredentialStore::with_cached(CachedToken::PasswordBased);
    let events = RecordingEventBus::new();
    let provider = ElloProvider::builder()
        .transport(transport.clone())
        .anonymous_exchange(ScriptedExchange::succeeding())
        .refresh_exchange(SlowExchange(Duration::from_secs(5)))
        .user_exchange(ScriptedExchange::succeeding())
        .credentials(credentials)
        .resolver(RecordingResolver::new())
        .events(events.clone())
        .foreground(InlineForeground::new())
        .initial_state(AuthState::Authenticated)
        .build()
        .unwrap();

    let pending = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.request(profile()).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.auth_state().await, AuthState::RefreshTokenSent);

    provider.logout().await.unwrap();
    assert_eq!(pending.await.unwrap(), Err(ProviderError::Unauthenticated));

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(provider.auth_state().await, AuthState::NoToken);
    assert_eq!(
        events.visited_states(),
        vec![AuthState::RefreshTokenSent, AuthState::NoToken]
    );
}

#[tokio::test(start_paused = true)]
async fn test_flag_policy_records_invalid_transitions() {
    let f = FixtureBuilder::new(MockTransport::new())
        .starting_in(AuthState::Authenticated)
        .policy(TransitionPolicy::Flag)
        .build();

    f.provider.authenticated(false).await.unwrap();

    assert_eq!(f.provider.auth_state().await, AuthState::Anonymous);
    assert_eq!(
        f.provider.violations().await,
        vec![Transition::new(AuthState::Authenticated, AuthState::Anonymous)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_warn_policy_does_not_record_invalid_transitions() {
    let f = FixtureBuilder::new(MockTransport::new())
        .starting_in(AuthState::Authenticated)
        .policy(TransitionPolicy::Warn)
        .build();

    f.provider.authenticated(false).await.unwrap();

    assert_eq!(f.provider.auth_state().await, AuthState::Anonymous);
    assert!(f.provider.violations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_new_requests() {
    let f = FixtureBuilder::new(MockTransport::new())
        .starting_in(AuthState::Authenticated)
        .build();

    f.provider.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(
        f.provider.request(Endpoint::get("/api/v2/categories")).await,
        Err(ProviderError::Dropped)
    );
    assert_eq!(f.transport.request_count(), 0);
}
