//! In-memory credential store.

use ello_core::environment::{CachedToken, CredentialStore, TokenSet, UserCredentials};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Stored {
    tokens: Option<TokenSet>,
    user: Option<UserCredentials>,
}

/// Credential store kept in process memory.
///
/// Lost on restart; applications that persist tokens provide their own
/// [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Stored>,
}

impl MemoryCredentialStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `tokens`.
    #[must_use]
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            inner: RwLock::new(Stored {
                tokens: Some(tokens),
                user: None,
            }),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Stored) -> Option<T>) -> Option<T> {
        match self.inner.read() {
            Ok(stored) => f(&stored),
            Err(_) => {
                tracing::error!("Credential store lock poisoned");
                None
            },
        }
    }

    fn write(&self, f: impl FnOnce(&mut Stored)) {
        match self.inner.write() {
            Ok(mut stored) => f(&mut stored),
            Err(_) => tracing::error!("Credential store lock poisoned"),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn cached_token(&self) -> CachedToken {
        self.read(|stored| {
            stored.tokens.as_ref().map(|tokens| {
                if tokens.password_based {
                    CachedToken::PasswordBased
                } else {
                    CachedToken::Anonymous
                }
            })
        })
        .unwrap_or_default()
    }

    fn access_token(&self) -> Option<String> {
        self.read(|stored| stored.tokens.as_ref().map(|t| t.access_token.clone()))
    }

    fn refresh_token(&self) -> Option<String> {
        self.read(|stored| stored.tokens.as_ref()?.refresh_token.clone())
    }

    fn user_credentials(&self) -> Option<UserCredentials> {
        self.read(|stored| stored.user.clone())
    }

    fn store_token(&self, tokens: TokenSet) {
        self.write(|stored| stored.tokens = Some(tokens));
    }

    fn save_user_credentials(&self, credentials: UserCredentials) {
        self.write(|stored| stored.user = Some(credentials));
    }

    fn reset(&self) {
        self.write(|stored| *stored = Stored::default());
    }
}
