//! Environment of the provider reducer.

use crate::config::TransitionPolicy;
use ello_core::environment::{
    CredentialExchange, CredentialStore, EventBus, ExchangeKind, Foreground, LinkedObjectResolver,
    Transport,
};
use std::sync::Arc;
use std::time::Duration;

/// Collaborators and settings injected into
/// [`ProviderReducer`](crate::reducer::ProviderReducer).
///
/// Cheap to clone: every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct ProviderEnvironment {
    /// Sends API requests.
    pub transport: Arc<dyn Transport>,
    /// Obtains anonymous tokens.
    pub anonymous_exchange: Arc<dyn CredentialExchange>,
    /// Refreshes user tokens.
    pub refresh_exchange: Arc<dyn CredentialExchange>,
    /// Logs in again with saved user credentials.
    pub user_exchange: Arc<dyn CredentialExchange>,
    /// Local token storage.
    pub credentials: Arc<dyn CredentialStore>,
    /// Absorbs `linked` side-tables.
    pub resolver: Arc<dyn LinkedObjectResolver>,
    /// Application-wide notifications.
    pub events: Arc<dyn EventBus>,
    /// Where caller callbacks run.
    pub foreground: Arc<dyn Foreground>,
    /// Pause before re-running auth after a network outage.
    pub auth_retry_delay: Duration,
    /// Pause before resending after a transport failure.
    pub transport_retry_delay: Duration,
    /// Handling of transitions missing from the transition table.
    pub transition_policy: TransitionPolicy,
}

impl ProviderEnvironment {
    /// The exchange that implements `kind`.
    #[must_use]
    pub fn exchange(&self, kind: ExchangeKind) -> &Arc<dyn CredentialExchange> {
        match kind {
            ExchangeKind::Anonymous => &self.anonymous_exchange,
            ExchangeKind::RefreshToken => &self.refresh_exchange,
            ExchangeKind::UserCredentials => &self.user_exchange,
        }
    }
}

impl std::fmt::Debug for ProviderEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEnvironment")
            .field("auth_retry_delay", &self.auth_retry_delay)
            .field("transport_retry_delay", &self.transport_retry_delay)
            .field("transition_policy", &self.transition_policy)
            .finish_non_exhaustive()
    }
}
