//! `ElloProvider`: the application-facing handle.

use crate::actions::{PendingRequest, ProviderAction, RequestId};
use crate::config::{ConfigError, ProviderConfig};
use crate::credentials::MemoryCredentialStore;
use crate::environment::ProviderEnvironment;
use crate::events::BroadcastEventBus;
use crate::exchange::OAuthExchange;
use crate::foreground::ForegroundQueue;
use crate::linked::LinkedObjectStore;
use crate::reducer::ProviderReducer;
use crate::state::ProviderState;
use crate::transport::ReqwestTransport;
use ello_core::environment::{
    CredentialExchange, CredentialStore, EventBus, ExchangeKind, Foreground, LinkedObjectResolver,
    ProviderEvent, Transport,
};
use ello_core::{
    ApiResponse, AuthState, Endpoint, Generation, NetworkRoute, ProviderError, Transition,
};
use ello_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

type ProviderStore = Store<ProviderState, ProviderAction, ProviderEnvironment, ProviderReducer>;

/// Handle to the request/auth orchestrator.
///
/// Cheap to clone; every clone drives the same state. Build one at the
/// application root with [`ElloProvider::builder`] and pass it down.
#[derive(Clone)]
pub struct ElloProvider {
    store: ProviderStore,
    bus: Option<BroadcastEventBus>,
    linked: Option<LinkedObjectStore>,
}

impl ElloProvider {
    /// Start building a provider.
    #[must_use]
    pub fn builder() -> ElloProviderBuilder {
        ElloProviderBuilder::default()
    }

    /// Dispatch `endpoint` with callbacks.
    ///
    /// Exactly one callback runs on the foreground context, except for a 410
    /// response, after which neither runs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun; the
    /// callbacks are dropped in that case.
    pub async fn dispatch<S, F>(
        &self,
        endpoint: Endpoint,
        on_success: S,
        on_failure: F,
    ) -> Result<RequestId, StoreError>
    where
        S: FnOnce(ApiResponse) + Send + Sync + 'static,
        F: FnOnce(ProviderError, Option<u16>) + Send + Sync + 'static,
    {
        let request = PendingRequest::new(endpoint, on_success, on_failure);
        let id = request.id();
        self.store.send(ProviderAction::Dispatch(request)).await?;
        Ok(id)
    }

    /// Dispatch `endpoint` and wait for its disposition.
    ///
    /// # Errors
    ///
    /// Returns the request's [`ProviderError`], or [`ProviderError::Dropped`]
    /// when it ends without a disposition (410 or shutdown).
    pub async fn request(&self, endpoint: Endpoint) -> Result<ApiResponse, ProviderError> {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest::with_completion(endpoint, move |result| {
            let _ = tx.send(result);
        });

        if let Err(error) = self.store.send(ProviderAction::Dispatch(request)).await {
            tracing::debug!(%error, "Request rejected");
            return Err(ProviderError::Dropped);
        }

        rx.await.unwrap_or(Err(ProviderError::Dropped))
    }

    /// [`request`](Self::request) over the given network route.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn request_via(
        &self,
        endpoint: Endpoint,
        route: NetworkRoute,
    ) -> Result<ApiResponse, ProviderError> {
        self.request(endpoint.with_route(route)).await
    }

    /// Discard credentials and fail or resend everything waiting.
    ///
    /// No-op when already logged out.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn logout(&self) -> Result<(), StoreError> {
        self.store.send(ProviderAction::Logout).await.map(drop)
    }

    /// Report a completed interactive login or join.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn authenticated(&self, password_based: bool) -> Result<(), StoreError> {
        self.store
            .send(ProviderAction::Authenticated { password_based })
            .await
            .map(drop)
    }

    /// Current auth state.
    pub async fn auth_state(&self) -> AuthState {
        self.store.state(|state| state.auth_state).await
    }

    /// Current credential generation.
    pub async fn generation(&self) -> Generation {
        self.store.state(|state| state.generation).await
    }

    /// Number of requests parked until auth settles.
    pub async fn waiting(&self) -> usize {
        self.store.state(|state| state.wait_list.len()).await
    }

    /// Illegal transitions recorded under
    /// [`TransitionPolicy::Flag`](crate::config::TransitionPolicy::Flag).
    pub async fn violations(&self) -> Vec<Transition> {
        self.store.state(|state| state.violations.clone()).await
    }

    /// Subscribe to provider events.
    ///
    /// `None` when the provider was built with a custom event bus.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.bus.as_ref().map(BroadcastEventBus::subscribe)
    }

    /// Linked entities received so far.
    ///
    /// `None` when the provider was built with a custom resolver.
    #[must_use]
    pub const fn linked_objects(&self) -> Option<&LinkedObjectStore> {
        self.linked.as_ref()
    }

    /// Injected collaborators.
    #[must_use]
    pub fn environment(&self) -> &ProviderEnvironment {
        self.store.environment()
    }

    /// Stop accepting actions and wait for in-flight effects.
    ///
    /// Requests still parked or waiting on a retry delay are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}

impl std::fmt::Debug for ElloProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElloProvider")
            .field("environment", self.store.environment())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ElloProvider`].
///
/// Collaborators left unset get production defaults built from the config:
/// [`ReqwestTransport`], one [`OAuthExchange`] per grant,
/// [`MemoryCredentialStore`], [`LinkedObjectStore`], [`BroadcastEventBus`] and
/// [`ForegroundQueue`].
#[derive(Default)]
pub struct ElloProviderBuilder {
    config: ProviderConfig,
    transport: Option<Arc<dyn Transport>>,
    anonymous_exchange: Option<Arc<dyn CredentialExchange>>,
    refresh_exchange: Option<Arc<dyn CredentialExchange>>,
    user_exchange: Option<Arc<dyn CredentialExchange>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    resolver: Option<Arc<dyn LinkedObjectResolver>>,
    events: Option<Arc<dyn EventBus>>,
    foreground: Option<Arc<dyn Foreground>>,
    initial_state: AuthState,
}

impl ElloProviderBuilder {
    /// Use `config`.
    #[must_use]
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom anonymous-credential exchange.
    #[must_use]
    pub fn anonymous_exchange(mut self, exchange: impl CredentialExchange + 'static) -> Self {
        self.anonymous_exchange = Some(Arc::new(exchange));
        self
    }

    /// Use a custom refresh-token exchange.
    #[must_use]
    pub fn refresh_exchange(mut self, exchange: impl CredentialExchange + 'static) -> Self {
        self.refresh_exchange = Some(Arc::new(exchange));
        self
    }

    /// Use a custom user-credential exchange.
    #[must_use]
    pub fn user_exchange(mut self, exchange: impl CredentialExchange + 'static) -> Self {
        self.user_exchange = Some(Arc::new(exchange));
        self
    }

    /// Use a custom credential store.
    #[must_use]
    pub fn credentials(mut self, credentials: impl CredentialStore + 'static) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    /// Use a custom linked-object resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: impl LinkedObjectResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Use a custom event bus.
    #[must_use]
    pub fn events(mut self, events: impl EventBus + 'static) -> Self {
        self.events = Some(Arc::new(events));
        self
    }

    /// Use a custom foreground context.
    #[must_use]
    pub fn foreground(mut self, foreground: impl Foreground + 'static) -> Self {
        self.foreground = Some(Arc::new(foreground));
        self
    }

    /// Start in `auth_state` instead of `Initial`.
    #[must_use]
    pub const fn initial_state(mut self, auth_state: AuthState) -> Self {
        self.initial_state = auth_state;
        self
    }

    /// Build the provider.
    ///
    /// Must run inside a tokio runtime when the default foreground is used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid configuration or when a default
    /// HTTP client cannot be built.
    pub fn build(self) -> Result<ElloProvider, ConfigError> {
        let config = self.config;
        config.validate()?;

        let credentials: Arc<dyn CredentialStore> = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config, Arc::clone(&credentials))?),
        };

        let exchange = |custom: Option<Arc<dyn CredentialExchange>>,
                        kind: ExchangeKind|
         -> Result<Arc<dyn CredentialExchange>, ConfigError> {
            match custom {
                Some(exchange) => Ok(exchange),
                None => Ok(Arc::new(OAuthExchange::new(
                    &config,
                    Arc::clone(&credentials),
                    kind,
                )?)),
            }
        };
        let anonymous_exchange = exchange(self.anonymous_exchange, ExchangeKind::Anonymous)?;
        let refresh_exchange = exchange(self.refresh_exchange, ExchangeKind::RefreshToken)?;
        let user_exchange = exchange(self.user_exchange, ExchangeKind::UserCredentials)?;

        let (resolver, linked) = match self.resolver {
            Some(resolver) => (resolver, None),
            None => {
                let linked = LinkedObjectStore::new();
                let resolver: Arc<dyn LinkedObjectResolver> = Arc::new(linked.clone());
                (resolver, Some(linked))
            },
        };

        let (events, bus) = match self.events {
            Some(events) => (events, None),
            None => {
                let bus = BroadcastEventBus::default();
                let events: Arc<dyn EventBus> = Arc::new(bus.clone());
                (events, Some(bus))
            },
        };

        let foreground: Arc<dyn Foreground> = self
            .foreground
            .unwrap_or_else(|| Arc::new(ForegroundQueue::spawn()));

        let environment = ProviderEnvironment {
            transport,
            anonymous_exchange,
            refresh_exchange,
            user_exchange,
            credentials,
            resolver,
            events,
            foreground,
            auth_retry_delay: config.auth_retry_delay,
            transport_retry_delay: config.transport_retry_delay,
            transition_policy: config.transition_policy,
        };

        tracing::debug!(
            api_url = %config.api_url,
            initial_state = %self.initial_state,
            "Provider built"
        );

        Ok(ElloProvider {
            store: Store::new(
                ProviderState::with_auth_state(self.initial_state),
                ProviderReducer::new(),
                environment,
            ),
            bus,
            linked,
        })
    }
}
