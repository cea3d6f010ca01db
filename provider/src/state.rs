//! Provider state.
//!
//! Owned by the store and mutated only by
//! [`ProviderReducer`](crate::reducer::ProviderReducer).

use crate::actions::{PendingRequest, RequestId};
use ello_core::{AuthState, Generation, Transition};

/// Requests parked while credentials are being (re-)established.
///
/// Append-only between flushes; a flush drains it to empty in one step, so
/// requests re-queued while a drained batch is being re-dispatched land in a
/// fresh list.
#[derive(Debug, Default)]
pub struct WaitList {
    requests: Vec<PendingRequest>,
}

impl WaitList {
    /// Empty wait list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Park a request.
    pub fn push(&mut self, request: PendingRequest) {
        self.requests.push(request);
    }

    /// Take every parked request, in arrival order, leaving the list empty.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Number of parked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Ids of the parked requests, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.iter().map(PendingRequest::id).collect()
    }

    /// Endpoint paths of the parked requests, in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|request| request.endpoint().path().to_string())
            .collect()
    }
}

/// State of the orchestrator.
#[derive(Debug, Default)]
pub struct ProviderState {
    /// Current credential lifecycle state.
    pub auth_state: AuthState,
    /// Credential generation, bumped on every `NoToken`, `Anonymous` and
    /// `Authenticated` entry.
    pub generation: Generation,
    /// Requests parked until auth settles.
    pub wait_list: WaitList,
    /// Transitions missing from the transition table, recorded under
    /// [`TransitionPolicy::Flag`](crate::config::TransitionPolicy::Flag).
    pub violations: Vec<Transition>,
}

impl ProviderState {
    /// Fresh state: `Initial`, first generation, nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State starting in `auth_state` (used to resume a known session).
    #[must_use]
    pub fn with_auth_state(auth_state: AuthState) -> Self {
        Self {
            auth_state,
            ..Self::default()
        }
    }
}
