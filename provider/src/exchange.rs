//! `OAuth` credential exchanges against `{base}/api/oauth/token`.

use crate::config::{ConfigError, ProviderConfig};
use crate::transport::transport_error;
use chrono::{DateTime, TimeDelta, Utc};
use ello_core::environment::{
    CredentialExchange, CredentialStore, ExchangeKind, ExchangeOutcome, TokenSet,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    created_at: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self, password_based: bool, now: DateTime<Utc>) -> TokenSet {
        let issued = self
            .created_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(now);
        // Out-of-range lifetimes leave the expiry unknown.
        let expires_at = self
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| issued.checked_add_signed(lifetime));

        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            password_based,
        }
    }
}

/// One grant of the `OAuth` token endpoint.
///
/// The grant is chosen by [`ExchangeKind`]:
/// - `Anonymous` → `client_credentials`
/// - `RefreshToken` → `refresh_token` (needs a stored refresh token)
/// - `UserCredentials` → `password` (needs saved user credentials)
///
/// Obtained tokens are written to the credential store.
#[derive(Clone)]
pub struct OAuthExchange {
    client: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    credentials: Arc<dyn CredentialStore>,
    grant: ExchangeKind,
}

impl OAuthExchange {
    /// Exchange for `grant`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the token URL is invalid or the client
    /// cannot be built.
    pub fn new(
        config: &ProviderConfig,
        credentials: Arc<dyn CredentialStore>,
        grant: ExchangeKind,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Client::builder().timeout(config.request_timeout).build()?,
            token_url: config.token_url()?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            credentials,
            grant,
        })
    }

    /// Grant this exchange performs.
    #[must_use]
    pub const fn grant(&self) -> ExchangeKind {
        self.grant
    }

    /// Form fields of the token request, or `None` when a local input is
    /// missing.
    fn form(&self) -> Option<Vec<(&'static str, String)>> {
        let mut form = vec![
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];

        match self.grant {
            ExchangeKind::Anonymous => {
                form.push(("grant_type", "client_credentials".to_string()));
            },
            ExchangeKind::RefreshToken => {
                form.push(("grant_type", "refresh_token".to_string()));
                form.push(("refresh_token", self.credentials.refresh_token()?));
            },
            ExchangeKind::UserCredentials => {
                let user = self.credentials.user_credentials()?;
                form.push(("grant_type", "password".to_string()));
                form.push(("email", user.email));
                form.push(("password", user.password));
            },
        }

        Some(form)
    }

    const fn password_based(&self) -> bool {
        !matches!(self.grant, ExchangeKind::Anonymous)
    }
}

impl CredentialExchange for OAuthExchange {
    fn attempt(&self) -> BoxFuture<'static, ExchangeOutcome> {
        let grant = self.grant;

        let Some(form) = self.form() else {
            tracing::debug!(?grant, "Missing local credentials for exchange");
            return async { ExchangeOutcome::Failed }.boxed();
        };

        let request = self.client.post(self.token_url.clone()).form(&form);
        let credentials = Arc::clone(&self.credentials);
        let password_based = self.password_based();

        async move {
            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    let error = transport_error(error);
                    tracing::debug!(?grant, %error, "Token request failed");
                    return if error.is_no_network() {
                        ExchangeOutcome::NoNetwork
                    } else {
                        ExchangeOutcome::Failed
                    };
                },
            };

            let status = response.status();
            if !status.is_success() {
                tracing::debug!(?grant, status = status.as_u16(), "Token request rejected");
                return ExchangeOutcome::Failed;
            }

            match response.json::<TokenResponse>().await {
                Ok(token) => {
                    credentials.store_token(token.into_token_set(password_based, Utc::now()));
                    ExchangeOutcome::Succeeded
                },
                Err(error) => {
                    tracing::warn!(?grant, %error, "Unreadable token response");
                    ExchangeOutcome::Failed
                },
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for OAuthExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthExchange")
            .field("token_url", &self.token_url.as_str())
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use ello_core::environment::UserCredentials;
    use ello_testing::MockCredentialStore;

    fn exchange(credentials: &MockCredentialStore, grant: ExchangeKind) -> OAuthExchange {
        OAuthExchange::new(
            &ProviderConfig::default().with_client("id", "secret"),
            Arc::new(credentials.clone()),
            grant,
        )
        .unwrap()
    }

    fn field<'a>(form: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_anonymous_uses_client_credentials() {
        let form = exchange(&MockCredentialStore::new(), ExchangeKind::Anonymous)
            .form()
            .unwrap();
        assert_eq!(field(&form, "grant_type"), Some("client_credentials"));
        assert_eq!(field(&form, "client_id"), Some("id"));
    }

    #[test]
    fn test_refresh_requires_refresh_token() {
        let credentials = MockCredentialStore::new();
        assert!(exchange(&credentials, ExchangeKind::RefreshToken).form().is_none());

        credentials.store_token(TokenSet {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: None,
            password_based: true,
        });
        let form = exchange(&credentials, ExchangeKind::RefreshToken).form().unwrap();
        assert_eq!(field(&form, "refresh_token"), Some("r"));
    }

    #[test]
    fn test_password_grant_uses_saved_login() {
        let credentials = MockCredentialStore::new();
        credentials.save_user_credentials(UserCredentials {
            email: "user@example.com".into(),
            password: "hunter2".into(),
        });

        let form = exchange(&credentials, ExchangeKind::UserCredentials)
            .form()
            .unwrap();

        assert_eq!(field(&form, "grant_type"), Some("password"));
        assert_eq!(field(&form, "email"), Some("user@example.com"));
    }

    #[tokio::test]
    async fn test_missing_inputs_fail_without_network() {
        let outcome = exchange(&MockCredentialStore::new(), ExchangeKind::UserCredentials)
            .attempt()
            .await;
        assert_eq!(outcome, ExchangeOutcome::Failed);
    }

    #[test]
    fn test_token_expiry_is_derived_from_creation_time() {
        let token = TokenResponse {
            access_token: "a".into(),
            refresh_token: None,
            expires_in: Some(3600),
            created_at: Some(1_700_000_000),
        };

        let set = token.into_token_set(false, Utc::now());

        assert_eq!(set.expires_at.unwrap().timestamp(), 1_700_003_600);
        assert!(!set.password_based);
    }

    #[test]
    fn test_out_of_range_lifetime_leaves_expiry_unknown() {
        for expires_in in [i64::MAX, 1_000_000_000_000_000, i64::MIN] {
            let token = TokenResponse {
                access_token: "a".into(),
                refresh_token: Some("r".into()),
                expires_in: Some(expires_in),
                created_at: None,
            };

            let set = token.into_token_set(true, Utc::now());

            assert_eq!(set.expires_at, None, "expires_in = {expires_in}");
            assert_eq!(set.access_token, "a");
        }
    }
}
