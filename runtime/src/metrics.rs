//! Metrics for observability and monitoring.
//!
//! This module describes every metric recorded by the workspace:
//! - Store command processing and reducer timing
//! - Effect execution
//! - Request dispositions, auth transitions and transport retries
//!
//! Recording goes through the `metrics` facade, so nothing is exported until
//! the application installs a recorder.
//!
//! # Example
//!
//! ```rust
//! use ello_runtime::metrics::{ProviderMetrics, register_metrics};
//!
//! register_metrics();
//! ProviderMetrics::record_dispatch("sent");
//! ```

use metrics::{describe_counter, describe_histogram};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Register all metric descriptions.
///
/// Call once after installing a recorder.
pub fn register_metrics() {
    // Store Metrics
    describe_counter!(
        "store.commands.total",
        "Total number of actions processed by the store"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to execute the reducer"
    );
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, by type"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Provider Metrics
    describe_counter!(
        "provider.requests.dispatched",
        "Requests dispatched, by disposition (sent, queued, rejected)"
    );
    describe_counter!(
        "provider.auth.transitions",
        "Auth state transitions, by target state"
    );
    describe_counter!(
        "provider.auth.invalid_transitions",
        "Auth state transitions missing from the transition table"
    );
    describe_counter!(
        "provider.transport.retries",
        "Requests rescheduled after a transport failure"
    );
    describe_counter!(
        "provider.responses.total",
        "Responses handled, by status class"
    );
}

/// Request orchestration metrics recorder.
pub struct ProviderMetrics;

impl ProviderMetrics {
    /// Record the immediate disposition of a dispatched request.
    pub fn record_dispatch(disposition: &'static str) {
        counter!("provider.requests.dispatched", "disposition" => disposition).increment(1);
    }

    /// Record an auth state transition.
    pub fn record_transition(to: &str, legal: bool) {
        counter!("provider.auth.transitions", "to" => to.to_string()).increment(1);
        if !legal {
            counter!("provider.auth.invalid_transitions").increment(1);
        }
    }

    /// Record a transport retry.
    pub fn record_transport_retry() {
        counter!("provider.transport.retries").increment(1);
    }

    /// Record a handled response by status class (`2xx`, `4xx`, ...).
    pub fn record_response(status: u16) {
        let class = match status {
            100..=199 => "1xx",
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };
        counter!("provider.responses.total", "class" => class).increment(1);
    }
}
