//! Collaborator traits injected into the reducer.
//!
//! The reducer never talks to the network, the keychain or the UI directly.
//! Everything outside the orchestrator sits behind one of these traits so that
//! production code and tests can plug in different implementations:
//!
//! - **Production**: reqwest transport, `OAuth` exchanges, broadcast event bus
//! - **Testing**: scripted mocks from `ello-testing`
//!
//! Async methods return [`BoxFuture`] so collaborators can be held as
//! `Arc<dyn Trait>`.

use crate::auth_state::{AuthState, Transition};
use crate::endpoint::Endpoint;
use crate::error::{ServerError, TransportError};
use crate::response::RawResponse;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sends requests to the API.
pub trait Transport: Send + Sync {
    /// Send the request described by `endpoint` over the route it selects.
    ///
    /// Any HTTP status is a successful send; only failures to obtain a
    /// response at all are errors.
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// Which credential exchange is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Client credentials for an anonymous token.
    Anonymous,
    /// Refresh of a user token.
    RefreshToken,
    /// Saved user name and password.
    UserCredentials,
}

impl ExchangeKind {
    /// The state the coordinator is in while this exchange is in flight.
    #[must_use]
    pub const fn sent_state(self) -> AuthState {
        match self {
            ExchangeKind::Anonymous => AuthState::AnonymousCredsSent,
            ExchangeKind::RefreshToken => AuthState::RefreshTokenSent,
            ExchangeKind::UserCredentials => AuthState::UserCredsSent,
        }
    }

    /// State after a successful exchange.
    #[must_use]
    pub const fn succeeded_state(self) -> AuthState {
        match self {
            ExchangeKind::Anonymous => AuthState::Anonymous,
            ExchangeKind::RefreshToken | ExchangeKind::UserCredentials => AuthState::Authenticated,
        }
    }

    /// State after the server rejected the exchange.
    #[must_use]
    pub const fn failed_state(self) -> AuthState {
        match self {
            ExchangeKind::RefreshToken => AuthState::ShouldTryUserCreds,
            ExchangeKind::Anonymous | ExchangeKind::UserCredentials => AuthState::NoToken,
        }
    }

    /// State to retry from when the network was unreachable.
    #[must_use]
    pub const fn retry_state(self) -> AuthState {
        match self {
            ExchangeKind::Anonymous => AuthState::ShouldTryAnonymousCreds,
            ExchangeKind::RefreshToken => AuthState::ShouldTryRefreshToken,
            ExchangeKind::UserCredentials => AuthState::ShouldTryUserCreds,
        }
    }
}

/// Result of one credential exchange attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// New tokens were obtained and stored.
    Succeeded,
    /// The server rejected the credentials, or none were available.
    Failed,
    /// The server could not be reached.
    NoNetwork,
}

impl ExchangeOutcome {
    /// State the coordinator moves to after `kind` ended with this outcome.
    #[must_use]
    pub const fn next_state(self, kind: ExchangeKind) -> AuthState {
        match self {
            ExchangeOutcome::Succeeded => kind.succeeded_state(),
            ExchangeOutcome::Failed => kind.failed_state(),
            ExchangeOutcome::NoNetwork => kind.retry_state(),
        }
    }
}

/// Obtains a fresh token from the auth server.
pub trait CredentialExchange: Send + Sync {
    /// Run one exchange. Resolves with exactly one outcome.
    fn attempt(&self) -> BoxFuture<'static, ExchangeOutcome>;
}

/// Kind of token held locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedToken {
    /// Nothing stored.
    #[default]
    None,
    /// An anonymous (client credentials) token.
    Anonymous,
    /// A token obtained with the user's password.
    PasswordBased,
}

/// Tokens returned by an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token.
    pub access_token: String,
    /// Token used to refresh a user session.
    pub refresh_token: Option<String>,
    /// Expiry of the access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the token belongs to a logged-in user.
    pub password_based: bool,
}

/// Saved login of the user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Email or username.
    pub email: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Local token storage.
///
/// Reads happen inside the reducer, so implementations must not block.
pub trait CredentialStore: Send + Sync {
    /// Which kind of token is cached.
    fn cached_token(&self) -> CachedToken;

    /// Current bearer token.
    fn access_token(&self) -> Option<String>;

    /// Current refresh token.
    fn refresh_token(&self) -> Option<String>;

    /// Saved user login, if any.
    fn user_credentials(&self) -> Option<UserCredentials>;

    /// Replace the stored tokens.
    fn store_token(&self, tokens: TokenSet);

    /// Remember the user login for later user-credential exchanges.
    fn save_user_credentials(&self, credentials: UserCredentials);

    /// Forget all tokens and saved credentials.
    fn reset(&self);
}

/// Side-table of related entities: entity type name to objects.
pub type LinkedObjects = BTreeMap<String, Vec<Value>>;

/// Absorbs the `linked` side-table of a response before its payload is mapped.
pub trait LinkedObjectResolver: Send + Sync {
    /// Resolve the linked objects. The payload is mapped only once this
    /// future completes.
    fn resolve(&self, linked: LinkedObjects) -> BoxFuture<'static, ()>;
}

/// Application-wide notifications published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Credentials were discarded; the user is logged out.
    ForcedLogout,
    /// An endpoint answered 410; the client is too old.
    Deprecated {
        /// Error decoded from the response.
        error: ServerError,
    },
    /// A request failed without a usable response.
    NetworkFailure {
        /// Status code, when a response was received.
        status: Option<u16>,
        /// What went wrong.
        error: String,
    },
    /// The auth state changed.
    StateChanged(Transition),
}

/// Delivers [`ProviderEvent`]s to the rest of the application.
pub trait EventBus: Send + Sync {
    /// Publish an event. Must not block.
    fn publish(&self, event: ProviderEvent);
}

/// Caller-facing work item.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution context on which callers receive results.
pub trait Foreground: Send + Sync {
    /// Run `job` on the foreground context.
    fn deliver(&self, job: Job);
}
