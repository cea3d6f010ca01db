//! # Ello Core
//!
//! Core traits and types for the Ello request/authentication orchestrator.
//!
//! This crate provides the building blocks shared by the runtime, the provider
//! and the test harnesses:
//!
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`, the only
//!   place where authentication state is mutated
//! - **Effect**: descriptions of side effects (network calls, delays,
//!   foreground delivery) executed by the runtime
//! - **`AuthState`**: the credential lifecycle state machine and its
//!   transition table
//! - **Endpoint**: the description of a single API call
//! - **Response**: raw transport responses, pagination metadata, payloads
//! - **Environment**: collaborator traits (transport, credential exchanges,
//!   credential store, linked-object resolver, event bus, foreground)
//!
//! ## Example
//!
//! ```ignore
//! use ello_core::{reducer::Reducer, effect::Effect, SmallVec, smallvec};
//!
//! impl Reducer for ProviderReducer {
//!     type State = ProviderState;
//!     type Action = ProviderAction;
//!     type Environment = ProviderEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut ProviderState,
//!         action: ProviderAction,
//!         env: &ProviderEnvironment,
//!     ) -> SmallVec<[Effect<ProviderAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub mod auth_state;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod response;

pub use auth_state::{AuthState, Generation, Transition};
pub use endpoint::{
    Endpoint, MappingType, Method, NetworkRoute, ParameterEncoding, TokenRequirement,
};
pub use environment::{
    CachedToken, CredentialExchange, CredentialStore, EventBus, ExchangeKind, ExchangeOutcome,
    Foreground, Job, LinkedObjectResolver, LinkedObjects, ProviderEvent, TokenSet, Transport,
    UserCredentials,
};
pub use error::{ProviderError, ServerError, TransportError};
pub use response::{ApiResponse, PageQuery, Payload, RawResponse, ResponseConfig};

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// The runtime calls them while holding the only write access to the state,
/// which makes them the single writer of everything they own.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer owns
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected collaborators this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effect descriptions to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values, not execution.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the `Store`.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (auth retries, transport retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap a future that feeds an action back into the reducer
        #[must_use]
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Wrap a fire-and-forget future that produces no feedback action
        #[must_use]
        pub fn run<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                fut.await;
                None
            }))
        }

        /// Returns true for `Effect::None`
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use std::time::Duration;

    #[test]
    fn test_effect_debug_hides_futures() {
        let effect: Effect<u8> = Effect::future(async { Some(1) });
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");

        let delayed: Effect<u8> = Effect::Delay {
            duration: Duration::from_secs(1),
            action: Box::new(7),
        };
        assert!(format!("{delayed:?}").contains("duration: 1s"));
    }

    #[test]
    fn test_effect_merge_and_chain() {
        let merged: Effect<u8> = Effect::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(merged, Effect::Parallel(ref effects) if effects.len() == 2));

        let chained: Effect<u8> = Effect::chain(vec![Effect::None]);
        assert!(matches!(chained, Effect::Sequential(ref effects) if effects.len() == 1));
    }

    #[test]
    fn test_run_effect_produces_no_action() {
        let Effect::Future(fut) = Effect::<u8>::run(async {}) else {
            unreachable!("run always builds a future effect");
        };
        assert_eq!(tokio_test::block_on(fut), None);
    }
}
