//! # Ello Testing
//!
//! Testing utilities and helpers for the Ello request/authentication
//! orchestrator.
//!
//! This crate provides:
//! - Mock implementations of every environment trait
//! - A Given-When-Then harness for reducers
//! - Property-based testing strategies
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use ello_testing::mocks::{MockTransport, RecordingEventBus};
//!
//! #[tokio::test]
//! async fn test_logout_broadcasts() {
//!     let events = RecordingEventBus::new();
//!     let provider = test_provider(MockTransport::new(), events.clone());
//!
//!     provider.logout().await?;
//!
//!     assert_eq!(events.forced_logouts(), 1);
//! }
//! ```

/// Mock implementations of the environment traits.
pub mod mocks;


/// Property-based testing utilities using proptest.
pub mod properties {
    use ello_core::endpoint::TokenRequirement;
    use ello_core::{AuthState, Endpoint};
    use proptest::prelude::*;

    /// Any auth state.
    pub fn any_auth_state() -> impl Strategy<Value = AuthState> {
        proptest::sample::select(AuthState::ALL.to_vec())
    }

    /// Any token requirement.
    pub fn any_token_requirement() -> impl Strategy<Value = TokenRequirement> {
        prop_oneof![
            Just(TokenRequirement::None),
            Just(TokenRequirement::Anonymous),
            Just(TokenRequirement::User),
        ]
    }

    /// GET endpoints with a short path and any token requirement.
    pub fn any_endpoint() -> impl Strategy<Value = Endpoint> {
        ("[a-z]{1,8}", any_token_requirement()).prop_map(|(segment, requirement)| {
            Endpoint::get(format!("/api/v2/{segment}")).with_token_requirement(requirement)
        })
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{
    InlineForeground, MockCredentialStore, MockTransport, RecordingEventBus, RecordingResolver,
    ScriptedExchange,
};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::properties::{any_auth_state, any_endpoint};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_generated_endpoints_are_api_paths(endpoint in any_endpoint()) {
            prop_assert!(endpoint.path().starts_with("/api/v2/"));
        }

        #[test]
        fn prop_authenticated_supports_generated_endpoints(
            endpoint in any_endpoint(),
            state in any_auth_state(),
        ) {
            if state.supports(&endpoint) {
                prop_assert!(ello_core::AuthState::Authenticated.supports(&endpoint));
            }
        }
    }
}
