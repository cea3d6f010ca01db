//! Credential lifecycle state machine.
//!
//! ## State Diagram
//!
//! ```text
//!                         ┌───────────┐
//!                         │  Initial  │ (undetermined)
//!                         └─────┬─────┘
//!        cached password token  │  cached anonymous token / nothing cached
//!          ┌────────────────────┼──────────────────────────┐
//!          ▼                    ▼                          ▼
//!  ┌───────────────┐     ┌─────────────┐     ┌──────────────────────────┐
//!  │ Authenticated │     │  Anonymous  │     │ ShouldTryAnonymousCreds  │
//!  └───────┬───────┘     └──────┬──────┘     └────────────┬─────────────┘
//!          │ 401                │ 401                     │
//!          ▼                    ▼                         ▼
//!  ┌──────────────────┐    ┌─────────┐  retry  ┌──────────────────────┐
//!  │ RefreshTokenSent │    │ NoToken │ ──────► │  AnonymousCredsSent  │
//!  └───────┬──────────┘    └─────────┘         └──────────────────────┘
//!          │ failed                ▲
//!          ▼                       │ failed
//!  ┌────────────────────┐   ┌──────┴────────┐
//!  │ ShouldTryUserCreds │──►│ UserCredsSent │
//!  └────────────────────┘   └───────────────┘
//! ```
//!
//! `ShouldTry*` states are re-entered when an exchange reports that the
//! network is unreachable; the coordinator backs off and retries from there.

use crate::endpoint::{Endpoint, TokenRequirement};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The credential lifecycle phase of the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Nothing determined yet; the cached token has not been inspected.
    #[default]
    Initial,
    /// No usable token. Only public endpoints can be called.
    NoToken,
    /// The anonymous exchange should be (re)tried, usually after a network outage.
    ShouldTryAnonymousCreds,
    /// The anonymous exchange is in flight.
    AnonymousCredsSent,
    /// An anonymous token is present.
    Anonymous,
    /// The refresh-token exchange should be (re)tried.
    ShouldTryRefreshToken,
    /// The refresh-token exchange is in flight.
    RefreshTokenSent,
    /// The user-credential exchange should be (re)tried.
    ShouldTryUserCreds,
    /// The user-credential exchange is in flight.
    UserCredsSent,
    /// A password-based user token is present.
    Authenticated,
}

impl AuthState {
    /// Every state, in declaration order.
    pub const ALL: [AuthState; 10] = [
        AuthState::Initial,
        AuthState::NoToken,
        AuthState::ShouldTryAnonymousCreds,
        AuthState::AnonymousCredsSent,
        AuthState::Anonymous,
        AuthState::ShouldTryRefreshToken,
        AuthState::RefreshTokenSent,
        AuthState::ShouldTryUserCreds,
        AuthState::UserCredsSent,
        AuthState::Authenticated,
    ];

    /// Legal successors of this state.
    #[must_use]
    pub const fn next_states(self) -> &'static [AuthState] {
        use AuthState::{
            Anonymous, AnonymousCredsSent, Authenticated, Initial, NoToken, RefreshTokenSent,
            ShouldTryAnonymousCreds, ShouldTryRefreshToken, ShouldTryUserCreds, UserCredsSent,
        };

        match self {
            Initial => &[NoToken, ShouldTryAnonymousCreds, Anonymous, Authenticated],
            NoToken => &[AnonymousCredsSent, UserCredsSent, Anonymous, Authenticated],
            ShouldTryAnonymousCreds => &[AnonymousCredsSent, NoToken],
            AnonymousCredsSent => &[Anonymous, ShouldTryAnonymousCreds, NoToken],
            Anonymous => &[UserCredsSent, Authenticated, NoToken],
            Authenticated => &[RefreshTokenSent, NoToken],
            ShouldTryRefreshToken => &[RefreshTokenSent, NoToken],
            RefreshTokenSent => &[
                Authenticated,
                ShouldTryRefreshToken,
                ShouldTryUserCreds,
                NoToken,
            ],
            ShouldTryUserCreds => &[UserCredsSent, NoToken],
            UserCredsSent => &[Authenticated, ShouldTryUserCreds, NoToken],
        }
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: AuthState) -> bool {
        self.next_states().contains(&next)
    }

    /// Whether an endpoint may be sent while in this state.
    ///
    /// Endpoints without a token requirement are always supported. An
    /// authenticated client supports everything; an anonymous one supports
    /// endpoints that accept any token.
    #[must_use]
    pub fn supports(self, endpoint: &Endpoint) -> bool {
        match endpoint.token_requirement() {
            TokenRequirement::None => true,
            TokenRequirement::Anonymous => {
                matches!(self, AuthState::Anonymous | AuthState::Authenticated)
            },
            TokenRequirement::User => self.is_authenticated(),
        }
    }

    /// True only for `Authenticated`.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// True only for `Initial`.
    #[must_use]
    pub const fn is_undetermined(self) -> bool {
        matches!(self, AuthState::Initial)
    }

    /// True for every `*Sent` and `ShouldTry*` state.
    #[must_use]
    pub const fn is_transitioning(self) -> bool {
        matches!(
            self,
            AuthState::ShouldTryAnonymousCreds
                | AuthState::AnonymousCredsSent
                | AuthState::ShouldTryRefreshToken
                | AuthState::RefreshTokenSent
                | AuthState::ShouldTryUserCreds
                | AuthState::UserCredsSent
        )
    }

    /// True for states from which no exchange is in progress.
    #[must_use]
    pub const fn is_stable(self) -> bool {
        !self.is_transitioning()
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Initial => "initial",
            AuthState::NoToken => "no_token",
            AuthState::ShouldTryAnonymousCreds => "should_try_anonymous_creds",
            AuthState::AnonymousCredsSent => "anonymous_creds_sent",
            AuthState::Anonymous => "anonymous",
            AuthState::ShouldTryRefreshToken => "should_try_refresh_token",
            AuthState::RefreshTokenSent => "refresh_token_sent",
            AuthState::ShouldTryUserCreds => "should_try_user_creds",
            AuthState::UserCredsSent => "user_creds_sent",
            AuthState::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// A change of [`AuthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State before the change.
    pub from: AuthState,
    /// State after the change.
    pub to: AuthState,
}

impl Transition {
    /// Create a transition description.
    #[must_use]
    pub const fn new(from: AuthState, to: AuthState) -> Self {
        Self { from, to }
    }

    /// Whether the transition table allows this change.
    #[must_use]
    pub fn is_legal(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Credential generation.
///
/// Bumped on every credential reset so that work started under an older
/// generation can tell it is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// The generation a fresh provider starts with.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// The generation that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}
