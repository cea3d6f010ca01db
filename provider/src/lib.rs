//! # Ello Provider
//!
//! Request/authentication orchestrator for the Ello API.
//!
//! Every API call goes through [`ElloProvider`], which decides per request
//! whether it can be sent with the current credentials, must wait for an
//! in-flight credential exchange, or fails as unauthenticated. A 401 response
//! transparently refreshes (or re-acquires) credentials and resends the
//! request; callers see only the final disposition.
//!
//! ## Architecture
//!
//! - [`ProviderReducer`]: auth coordinator, request dispatcher and response
//!   handler, the only writer of [`ProviderState`]
//! - [`ElloProvider`]: store-backed handle with callback and future APIs
//! - Production collaborators: [`ReqwestTransport`], [`OAuthExchange`],
//!   [`MemoryCredentialStore`], [`LinkedObjectStore`], [`BroadcastEventBus`],
//!   [`ForegroundQueue`]
//!
//! ## Example
//!
//! ```ignore
//! use ello_provider::{ElloProvider, ProviderConfig};
//! use ello_core::{Endpoint, MappingType, TokenRequirement};
//!
//! let provider = ElloProvider::builder()
//!     .config(ProviderConfig::from_env())
//!     .build()?;
//!
//! let categories = provider
//!     .request(
//!         Endpoint::get("/api/v2/categories")
//!             .with_token_requirement(TokenRequirement::Anonymous)
//!             .with_mapping(MappingType::node("categories")),
//!     )
//!     .await?;
//! ```

pub mod actions;
pub mod client;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod events;
pub mod exchange;
pub mod foreground;
pub mod linked;
pub mod reducer;
mod response_handler;
pub mod state;
pub mod transport;

pub use actions::{Completion, PendingRequest, ProviderAction, RequestId};
pub use client::{ElloProvider, ElloProviderBuilder};
pub use config::{ConfigError, DEFAULT_API_URL, ProviderConfig, TransitionPolicy};
pub use credentials::MemoryCredentialStore;
pub use environment::ProviderEnvironment;
pub use events::BroadcastEventBus;
pub use exchange::OAuthExchange;
pub use foreground::ForegroundQueue;
pub use linked::LinkedObjectStore;
pub use reducer::ProviderReducer;
pub use state::{ProviderState, WaitList};
pub use transport::{ReqwestTransport, StubTransport};
