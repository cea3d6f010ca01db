//! Provider actions and pending requests.
//!
//! Actions are the only way to change [`ProviderState`](crate::state::ProviderState).
//! Callers send `Dispatch`, `Logout` and `Authenticated`; effects feed back
//! `CredentialsExchanged`, `TransportCompleted` and `RetryAuthentication`.

use ello_core::environment::{ExchangeKind, ExchangeOutcome, Foreground};
use ello_core::{
    ApiResponse, AuthState, Endpoint, Generation, ProviderError, RawResponse, TransportError,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a request, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Allocate a fresh, process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Completion callback of a request.
///
/// `Sync` because parked requests live in the shared provider state.
pub type Completion = Box<dyn FnOnce(Result<ApiResponse, ProviderError>) + Send + Sync + 'static>;

/// A request waiting for its single terminal disposition.
///
/// Delivering a disposition consumes the request, so callers hear back at
/// most once. Dropping it without a disposition drops the callbacks.
pub struct PendingRequest {
    id: RequestId,
    endpoint: Endpoint,
    completion: Completion,
}

impl PendingRequest {
    /// Request with separate success and failure callbacks.
    ///
    /// The failure callback receives the error and its status code.
    pub fn new<S, F>(endpoint: Endpoint, on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(ApiResponse) + Send + Sync + 'static,
        F: FnOnce(ProviderError, Option<u16>) + Send + Sync + 'static,
    {
        Self::with_completion(endpoint, move |result| match result {
            Ok(response) => on_success(response),
            Err(error) => {
                let status = error.status();
                on_failure(error, status);
            },
        })
    }

    /// Request with a single completion callback.
    pub fn with_completion<C>(endpoint: Endpoint, completion: C) -> Self
    where
        C: FnOnce(Result<ApiResponse, ProviderError>) + Send + Sync + 'static,
    {
        Self {
            id: RequestId::next(),
            endpoint,
            completion: Box::new(completion),
        }
    }

    /// Request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Target endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Deliver `result` on the foreground context.
    pub fn complete(self, foreground: &dyn Foreground, result: Result<ApiResponse, ProviderError>) {
        let completion = self.completion;
        foreground.deliver(Box::new(move || completion(result)));
    }

    /// Deliver a success on the foreground context.
    pub fn succeed(self, foreground: &dyn Foreground, response: ApiResponse) {
        self.complete(foreground, Ok(response));
    }

    /// Deliver a failure on the foreground context.
    pub fn fail(self, foreground: &dyn Foreground, error: ProviderError) {
        self.complete(foreground, Err(error));
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.to_string())
            .finish_non_exhaustive()
    }
}

/// Everything the provider reducer reacts to.
#[derive(Debug)]
pub enum ProviderAction {
    // ========== Caller actions ==========
    /// Send a request, queue it, or fail it, depending on the auth state.
    Dispatch(PendingRequest),

    /// Force the `NoToken` state.
    Logout,

    /// An interactive login or join completed.
    Authenticated {
        /// Whether the new token is password-based.
        password_based: bool,
    },

    // ========== Coordinator actions ==========
    /// Run the coordinator for the current state.
    ///
    /// A request dispatched under an older generation is re-dispatched
    /// instead of being queued.
    Authenticate {
        /// Request that triggered the attempt (usually after a 401).
        request: Option<PendingRequest>,
        /// Generation the request was dispatched under.
        generation: Generation,
    },

    /// The auth retry delay elapsed; re-run the coordinator.
    ///
    /// Ignored unless the state is still `from` under `generation`.
    RetryAuthentication {
        /// Generation current when the retry was scheduled.
        generation: Generation,
        /// Auth state the retry was scheduled from.
        from: AuthState,
    },

    /// A credential exchange finished.
    CredentialsExchanged {
        /// Which exchange ran.
        kind: ExchangeKind,
        /// How it ended.
        outcome: ExchangeOutcome,
    },

    // ========== Transport actions ==========
    /// The transport finished a request.
    TransportCompleted {
        /// The request that was sent.
        request: PendingRequest,
        /// Generation captured when it was sent.
        generation: Generation,
        /// Response, or why there is none.
        outcome: Result<RawResponse, TransportError>,
    },
}
