//! Response handling for completed transport calls.
//!
//! Classifies a [`RawResponse`] by status and either delivers a mapped
//! [`ApiResponse`], re-enters the coordinator (401), drops the request (410),
//! or fails it with a decoded [`ServerError`].

use crate::actions::{PendingRequest, ProviderAction};
use crate::environment::ProviderEnvironment;
use crate::reducer::{Effects, ProviderReducer};
use crate::state::ProviderState;
use ello_core::effect::Effect;
use ello_core::environment::{LinkedObjects, ProviderEvent};
use ello_core::{
    ApiResponse, Endpoint, Generation, MappingType, Payload, ProviderError, RawResponse,
    ResponseConfig, ServerError, TransportError,
};
use ello_runtime::metrics::ProviderMetrics;
use serde_json::Value;
use std::sync::Arc;

impl ProviderReducer {
    /// Route a finished transport call.
    pub(crate) fn handle_completion(
        self,
        state: &mut ProviderState,
        request: PendingRequest,
        generation: Generation,
        outcome: Result<RawResponse, TransportError>,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                Self::retry_after_transport_failure(request, &error, env, effects);
                return;
            },
        };

        ProviderMetrics::record_response(response.status);

        match response.status {
            200..=399 => Self::handle_success(request, response, env, effects),
            401 => {
                tracing::debug!(
                    request = %request.id(),
                    endpoint = %request.endpoint(),
                    "Request unauthorized, re-authenticating"
                );
                self.authenticate(state, Some(request), generation, env, effects);
            },
            410 => {
                let error = ServerError::from_body(response.status, &response.body);
                tracing::warn!(
                    request = %request.id(),
                    endpoint = %request.endpoint(),
                    "Endpoint gone, client is deprecated"
                );
                env.events.publish(ProviderEvent::Deprecated { error });
                drop(request);
            },
            status => {
                let error = ServerError::from_body(status, &response.body);
                tracing::warn!(
                    path = request.endpoint().path(),
                    status,
                    title = %error.title,
                    "Server error"
                );
                request.fail(env.foreground.as_ref(), ProviderError::Server(error));
            },
        }
    }

    fn retry_after_transport_failure(
        request: PendingRequest,
        error: &TransportError,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        tracing::warn!(
            request = %request.id(),
            endpoint = %request.endpoint(),
            %error,
            delay = ?env.transport_retry_delay,
            "Transport failed, resending after delay"
        );
        ProviderMetrics::record_transport_retry();
        env.events.publish(ProviderEvent::NetworkFailure {
            status: None,
            error: error.to_string(),
        });
        effects.push(Effect::Delay {
            duration: env.transport_retry_delay,
            action: Box::new(ProviderAction::Dispatch(request)),
        });
    }

    fn handle_success(
        request: PendingRequest,
        response: RawResponse,
        env: &ProviderEnvironment,
        effects: &mut Effects,
    ) {
        let config = ResponseConfig::from_response(&response);

        let body = match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(body)) => body,
            Ok(_) => {
                request.fail(
                    env.foreground.as_ref(),
                    ProviderError::mapping("response body is not a JSON object"),
                );
                return;
            },
            Err(error) => {
                if response.is_empty_success() {
                    request.succeed(
                        env.foreground.as_ref(),
                        ApiResponse {
                            payload: Payload::Empty,
                            config,
                        },
                    );
                } else {
                    request.fail(
                        env.foreground.as_ref(),
                        ProviderError::mapping(format!("invalid JSON: {error}")),
                    );
                }
                return;
            },
        };

        let linked = body
            .get("linked")
            .cloned()
            .and_then(|linked| serde_json::from_value::<LinkedObjects>(linked).ok());

        match linked {
            Some(linked) => {
                let resolver = Arc::clone(&env.resolver);
                let foreground = Arc::clone(&env.foreground);
                tracing::trace!(
                    request = %request.id(),
                    types = linked.len(),
                    "Resolving linked objects"
                );
                effects.push(Effect::run(async move {
                    resolver.resolve(linked).await;
                    let result = map_body(request.endpoint(), &Value::Object(body), config);
                    request.complete(foreground.as_ref(), result);
                }));
            },
            None => {
                let result = map_body(request.endpoint(), &Value::Object(body), config);
                request.complete(env.foreground.as_ref(), result);
            },
        }
    }
}

/// Map a decoded JSON object onto the endpoint's mapping node.
///
/// Pagination found at `node.links[paging_path].pagination` replaces the
/// header-derived page counts and queries; status code and `Last-Modified`
/// stay from the headers.
pub(crate) fn map_body(
    endpoint: &Endpoint,
    body: &Value,
    config: ResponseConfig,
) -> Result<ApiResponse, ProviderError> {
    let key = match endpoint.mapping() {
        MappingType::NoContent => {
            return Ok(ApiResponse {
                payload: Payload::Empty,
                config,
            });
        },
        MappingType::Node(key) => key,
    };

    let Some(node) = body.get(key) else {
        return Err(ProviderError::mapping(format!("missing node {key:?}")));
    };

    let pagination = endpoint
        .paging_path()
        .and_then(|paging_path| node.get("links")?.get(paging_path)?.get("pagination"))
        .and_then(ResponseConfig::from_body_pagination);
    let config = match pagination {
        Some(pagination) => ResponseConfig {
            status_code: config.status_code,
            last_modified: config.last_modified,
            ..pagination
        },
        None => config,
    };

    let payload = match node {
        Value::Object(_) => Payload::One(node.clone()),
        Value::Array(items) if items.iter().all(Value::is_object) => Payload::Many(items.clone()),
        Value::Array(_) => {
            return Err(ProviderError::mapping(format!(
                "node {key:?} is not an array of objects"
            )));
        },
        _ => {
            return Err(ProviderError::mapping(format!(
                "node {key:?} is neither an object nor an array"
            )));
        },
    };

    Ok(ApiResponse { payload, config })
}
