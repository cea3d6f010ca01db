//! Provider configuration.
//!
//! Configuration values are provided by the application, usually through
//! [`ProviderConfig::from_env`].

use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default API host.
pub const DEFAULT_API_URL: &str = "https://ello.co/";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The API URL could not be parsed.
    #[error("Invalid API URL {url:?}: {source}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// A setting has an unusable value.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// What to do when the auth state changes along an edge that is missing from
/// the transition table.
///
/// Transitions are never blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Log a warning and continue.
    #[default]
    Warn,
    /// Log an error and record the transition in
    /// [`ProviderState::violations`](crate::state::ProviderState::violations).
    Flag,
}

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API base URL (e.g., `https://ello.co/`).
    pub api_url: String,

    /// `OAuth` client id.
    pub client_id: String,

    /// `OAuth` client secret.
    pub client_secret: String,

    /// Pause before retrying auth after a network outage.
    ///
    /// Default: 1 second
    pub auth_retry_delay: Duration,

    /// Pause before resending a request that failed in transport.
    ///
    /// Default: 1 second
    pub transport_retry_delay: Duration,

    /// Timeout of the primary HTTP client.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Timeout of the restricted secondary HTTP client.
    ///
    /// Default: 10 seconds
    pub restricted_timeout: Duration,

    /// Handling of transitions missing from the transition table.
    pub transition_policy: TransitionPolicy,
}

impl ProviderConfig {
    /// Create new provider configuration.
    ///
    /// # Arguments
    ///
    /// * `api_url` - API base URL (e.g., `https://ello.co/`)
    #[must_use]
    pub const fn new(api_url: String) -> Self {
        Self {
            api_url,
            client_id: String::new(),
            client_secret: String::new(),
            auth_retry_delay: Duration::from_secs(1),
            transport_retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            restricted_timeout: Duration::from_secs(10),
            transition_policy: TransitionPolicy::Warn,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `ELLO_API_URL`, `ELLO_CLIENT_ID`, `ELLO_CLIENT_SECRET`,
    /// `ELLO_AUTH_RETRY_DELAY_MS`, `ELLO_TRANSPORT_RETRY_DELAY_MS`,
    /// `ELLO_REQUEST_TIMEOUT_SECS` and `ELLO_RESTRICTED_TIMEOUT_SECS`.
    /// Missing or unparseable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_url: env::var("ELLO_API_URL").unwrap_or(defaults.api_url),
            client_id: env::var("ELLO_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("ELLO_CLIENT_SECRET").unwrap_or_default(),
            auth_retry_delay: env::var("ELLO_AUTH_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.auth_retry_delay, Duration::from_millis),
            transport_retry_delay: env::var("ELLO_TRANSPORT_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.transport_retry_delay, Duration::from_millis),
            request_timeout: env::var("ELLO_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.request_timeout, Duration::from_secs),
            restricted_timeout: env::var("ELLO_RESTRICTED_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.restricted_timeout, Duration::from_secs),
            transition_policy: defaults.transition_policy,
        }
    }

    /// Set the `OAuth` client credentials.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Set the auth retry delay.
    #[must_use]
    pub const fn with_auth_retry_delay(mut self, delay: Duration) -> Self {
        self.auth_retry_delay = delay;
        self
    }

    /// Set the transport retry delay.
    #[must_use]
    pub const fn with_transport_retry_delay(mut self, delay: Duration) -> Self {
        self.transport_retry_delay = delay;
        self
    }

    /// Set the primary and restricted request timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, request: Duration, restricted: Duration) -> Self {
        self.request_timeout = request;
        self.restricted_timeout = restricted;
        self
    }

    /// Set the transition policy.
    #[must_use]
    pub const fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transition_policy = policy;
        self
    }

    /// Parsed API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `api_url` is not an absolute URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.api_url.clone(),
            source,
        })
    }

    /// `OAuth` token endpoint (`{base}/api/oauth/token`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL cannot be built.
    pub fn token_url(&self) -> Result<Url, ConfigError> {
        self.base_url()?
            .join("/api/oauth/token")
            .map_err(|source| ConfigError::InvalidUrl {
                url: self.api_url.clone(),
                source,
            })
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable URL or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        for (key, timeout) in [
            ("request_timeout", self.request_timeout),
            ("restricted_timeout", self.restricted_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: format!("{timeout:?}"),
                });
            }
        }

        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL.to_string())
    }
}
