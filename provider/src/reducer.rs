//! Provider reducer: auth coordinator and request dispatcher.
//!
//! This module implements the orchestration logic. It runs under the store's
//! write lock, which makes it the single writer of the auth state, the
//! generation and the wait list.
//!
//! # Flow
//!
//! ```text
//! 1. Dispatch → send (state supports endpoint) | queue (auth in flight) | fail (401)
//! 2. TransportCompleted → response handler; 401 → Authenticate
//! 3. Authenticate → per-state handler → credential exchange effect
//! 4. CredentialsExchanged → advance → flush wait list (or retry after a delay)
//! ```

use crate::actions::{PendingRequest, ProviderAction};
use crate::config::TransitionPolicy;
use crate::environment::ProviderEnvironment;
use crate::state::ProviderState;
use ello_core::effect::Effect;
use ello_core::environment::{CachedToken, ExchangeKind, ProviderEvent};
use ello_core::reducer::Reducer;
use ello_core::{AuthState, Generation, ProviderError, SmallVec, Transition};
use ello_runtime::metrics::ProviderMetrics;
use std::sync::Arc;

/// Effects returned by one reducer pass.
pub(crate) type Effects = SmallVec<[Effect<ProviderAction>; 4]>;

/// Provider reducer.
///
/// Combines the auth coordinator, the request dispatcher and the response
/// handler (see [`crate::response_handler`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderReducer;

impl ProviderReducer {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Request dispatcher
    // ═══════════════════════════════════════════════════════════════════════

    /// Send, queue or fail `request` depending on the auth state.
    pub(crate) fn dispatch(
        self,
        state: &mut ProviderState,
        request: PendingRequest,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        let auth_state = state.auth_state;

        if auth_state.is_undetermined() {
            tracing::debug!(request = %request.id(), "Auth undetermined, inspecting cached token");
            ProviderMetrics::record_dispatch("queued");
            let generation = state.generation;
            self.authenticate(state, Some(request), generation, env, effects);
        } else if auth_state.is_transitioning() {
            tracing::debug!(
                request = %request.id(),
                auth_state = %auth_state,
                "Auth in flight, queueing request"
            );
            ProviderMetrics::record_dispatch("queued");
            state.wait_list.push(request);
        } else if auth_state.supports(request.endpoint()) {
            ProviderMetrics::record_dispatch("sent");
            Self::send(state, request, env, effects);
        } else {
            tracing::debug!(
                request = %request.id(),
                auth_state = %auth_state,
                endpoint = %request.endpoint(),
                "Endpoint not supported by current credentials"
            );
            ProviderMetrics::record_dispatch("rejected");
            request.fail(env.foreground.as_ref(), ProviderError::Unauthenticated);
        }
    }

    /// Hand `request` to the transport, tagged with the current generation.
    fn send(
        state: &ProviderState,
        request: PendingRequest,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        let generation = state.generation;
        tracing::debug!(
            request = %request.id(),
            endpoint = %request.endpoint(),
            %generation,
            "Sending request"
        );

        let response = env.transport.send(request.endpoint().clone());
        effects.push(Effect::future(async move {
            let outcome = response.await;
            Some(ProviderAction::TransportCompleted {
                request,
                generation,
                outcome,
            })
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Auth coordinator
    // ═══════════════════════════════════════════════════════════════════════

    /// Run the per-state auth handler, parking `request` first.
    ///
    /// A request dispatched under an older generation is re-dispatched
    /// against the current state instead.
    pub(crate) fn authenticate(
        self,
        state: &mut ProviderState,
        request: Option<PendingRequest>,
        generation: Generation,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        if let Some(request) = request {
            if generation != state.generation {
                tracing::debug!(
                    request = %request.id(),
                    request_generation = %generation,
                    current_generation = %state.generation,
                    "Credentials changed since dispatch, resending"
                );
                self.dispatch(state, request, env, effects);
                return;
            }
            state.wait_list.push(request);
        }

        match state.auth_state {
            AuthState::Initial => {
                let next = match env.credentials.cached_token() {
                    CachedToken::PasswordBased => AuthState::Authenticated,
                    CachedToken::Anonymous => AuthState::Anonymous,
                    CachedToken::None => AuthState::ShouldTryAnonymousCreds,
                };
                self.advance(state, next, env, effects);
            },
            AuthState::Anonymous => {
                // Anonymous sessions never self-heal: a 401 logs out.
                self.advance(state, AuthState::NoToken, env, effects);
            },
            AuthState::Authenticated | AuthState::ShouldTryRefreshToken => {
                Self::start_exchange(state, ExchangeKind::RefreshToken, env, effects);
            },
            AuthState::ShouldTryUserCreds => {
                Self::start_exchange(state, ExchangeKind::UserCredentials, env, effects);
            },
            AuthState::ShouldTryAnonymousCreds | AuthState::NoToken => {
                Self::start_exchange(state, ExchangeKind::Anonymous, env, effects);
            },
            AuthState::AnonymousCredsSent
            | AuthState::RefreshTokenSent
            | AuthState::UserCredsSent => {
                tracing::trace!(auth_state = %state.auth_state, "Exchange already in flight");
            },
        }
    }

    /// Enter the `*Sent` state of `kind` and run the exchange.
    fn start_exchange(
        state: &mut ProviderState,
        kind: ExchangeKind,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        Self::set_auth_state(state, kind.sent_state(), env);

        let attempt = env.exchange(kind).attempt();
        effects.push(Effect::future(async move {
            let outcome = attempt.await;
            Some(ProviderAction::CredentialsExchanged { kind, outcome })
        }));
    }

    /// Move to `next` and run its entry behavior.
    pub(crate) fn advance(
        self,
        state: &mut ProviderState,
        next: AuthState,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        Self::set_auth_state(state, next, env);

        match next {
            AuthState::NoToken => {
                state.generation = state.generation.next();
                env.credentials.reset();
                self.flush(state, env, effects);

                let events = Arc::clone(&env.events);
                effects.push(Effect::run(async move {
                    events.publish(ProviderEvent::ForcedLogout);
                    events.publish(ProviderEvent::NetworkFailure {
                        status: ProviderError::Unauthenticated.status(),
                        error: ProviderError::Unauthenticated.to_string(),
                    });
                }));
            },
            AuthState::Anonymous | AuthState::Authenticated => {
                state.generation = state.generation.next();
                self.flush(state, env, effects);
            },
            _ => {
                tracing::debug!(
                    auth_state = %next,
                    delay = ?env.auth_retry_delay,
                    "Retrying auth after delay"
                );
                effects.push(Effect::Delay {
                    duration: env.auth_retry_delay,
                    action: Box::new(ProviderAction::RetryAuthentication {
                        generation: state.generation,
                        from: next,
                    }),
                });
            },
        }
    }

    /// Re-dispatch every parked request against the current state.
    ///
    /// The list is drained before re-dispatching, so requests parked again
    /// during the pass land in a new list.
    fn flush(self, state: &mut ProviderState, env: &ProviderEnvironment, effects: &mut Effects) {
        let waiting = state.wait_list.drain();
        if !waiting.is_empty() {
            tracing::debug!(
                count = waiting.len(),
                auth_state = %state.auth_state,
                generation = %state.generation,
                "Flushing wait list"
            );
        }

        for request in waiting {
            self.dispatch(state, request, env, effects);
        }
    }

    /// Assign the auth state, checking the transition table.
    ///
    /// Same-state assignments are silent. Illegal transitions are logged and
    /// applied; under [`TransitionPolicy::Flag`] they are also recorded.
    fn set_auth_state(state: &mut ProviderState, next: AuthState, env: &ProviderEnvironment) {
        let current = state.auth_state;
        if current == next {
            return;
        }

        let transition = Transition::new(current, next);
        let legal = transition.is_legal();
        if !legal {
            match env.transition_policy {
                TransitionPolicy::Warn => {
                    tracing::warn!(%transition, "Invalid auth state transition");
                },
                TransitionPolicy::Flag => {
                    tracing::error!(%transition, "Invalid auth state transition");
                    state.violations.push(transition);
                },
            }
        }

        tracing::debug!(%transition, "Auth state changed");
        ProviderMetrics::record_transition(&next.to_string(), legal);
        state.auth_state = next;
        env.events.publish(ProviderEvent::StateChanged(transition));
    }
}

impl Reducer for ProviderReducer {
    type State = ProviderState;
    type Action = ProviderAction;
    type Environment = ProviderEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut effects = Effects::new();

        match action {
            ProviderAction::Dispatch(request) => {
                self.dispatch(state, request, env, &mut effects);
            },

            ProviderAction::Logout => {
                if state.auth_state.can_transition_to(AuthState::NoToken) {
                    self.advance(state, AuthState::NoToken, env, &mut effects);
                } else {
                    tracing::debug!(auth_state = %state.auth_state, "Logout ignored");
                }
            },

            ProviderAction::Authenticated { password_based } => {
                let next = if password_based {
                    AuthState::Authenticated
                } else {
                    AuthState::Anonymous
                };
                self.advance(state, next, env, &mut effects);
            },

            ProviderAction::Authenticate {
                request,
                generation,
            } => {
                self.authenticate(state, request, generation, env, &mut effects);
            },

            ProviderAction::RetryAuthentication { generation, from } => {
                if state.generation == generation && state.auth_state == from {
                    self.authenticate(state, None, generation, env, &mut effects);
                } else {
                    tracing::debug!(
                        retry_generation = %generation,
                        retry_from = %from,
                        generation = %state.generation,
                        auth_state = %state.auth_state,
                        "Discarding stale auth retry"
                    );
                }
            },

            ProviderAction::CredentialsExchanged { kind, outcome } => {
                if state.auth_state == kind.sent_state() {
                    tracing::debug!(?kind, ?outcome, "Credential exchange finished");
                    self.advance(state, outcome.next_state(kind), env, &mut effects);
                } else {
                    tracing::debug!(
                        ?kind,
                        ?outcome,
                        auth_state = %state.auth_state,
                        "Discarding stale credential exchange result"
                    );
                }
            },

            ProviderAction::TransportCompleted {
                request,
                generation,
                outcome,
            } => {
                self.handle_completion(state, request, generation, outcome, env, &mut effects);
            },
        }

        effects
    }
}
