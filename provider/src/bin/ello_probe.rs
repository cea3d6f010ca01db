//! Ello probe
//!
//! Builds a provider from the environment, fetches the public category list
//! anonymously and logs what happened along the way.
//!
//! # Usage
//!
//! ```bash
//! ELLO_CLIENT_ID=... ELLO_CLIENT_SECRET=... cargo run --bin ello-probe
//! ```

use anyhow::Context;
use ello_core::{Endpoint, MappingType, TokenRequirement};
use ello_provider::events::next_event;
use ello_provider::{ElloProvider, ProviderConfig};
use ello_runtime::metrics::register_metrics;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ello_provider=debug,ello_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    register_metrics();

    let config = ProviderConfig::from_env();
    tracing::info!(api_url = %config.api_url, "Starting probe");

    let provider = ElloProvider::builder()
        .config(config)
        .build()
        .context("failed to build provider")?;

    if let Some(mut events) = provider.subscribe() {
        tokio::spawn(async move {
            while let Some(event) = next_event(&mut events).await {
                tracing::info!(?event, "Provider event");
            }
        });
    }

    let endpoint = Endpoint::get("/api/v2/categories")
        .with_token_requirement(TokenRequirement::Anonymous)
        .with_mapping(MappingType::node("categories"));

    let result = tokio::time::timeout(Duration::from_secs(30), provider.request(endpoint))
        .await
        .context("probe timed out")?;

    match result {
        Ok(response) => tracing::info!(
            payload = %response.payload.to_value(),
            total_count = ?response.config.total_count,
            "Categories fetched"
        ),
        Err(error) => tracing::error!(%error, status = ?error.status(), "Probe request failed"),
    }

    tracing::info!(auth_state = %provider.auth_state().await, "Final auth state");

    provider
        .shutdown(Duration::from_secs(5))
        .await
        .context("shutdown failed")?;

    Ok(())
}
