//! Endpoint descriptions.
//!
//! An [`Endpoint`] is everything the orchestrator needs to know about one API
//! call: where it goes, how parameters are encoded, which token it needs and
//! how its response body is mapped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use url::Url;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl Method {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How parameters travel with the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterEncoding {
    /// Appended to the URL query string.
    #[default]
    Url,
    /// Sent as a JSON body.
    Json,
    /// Sent as an `application/x-www-form-urlencoded` body.
    Form,
}

/// Which credential an endpoint needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRequirement {
    /// Public endpoint, no token needed.
    None,
    /// Any token, including an anonymous one.
    Anonymous,
    /// A password-based user token.
    #[default]
    User,
}

/// Which network configuration carries the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRoute {
    /// The main application network configuration.
    #[default]
    Primary,
    /// The restricted secondary configuration (extensions, background work).
    Secondary,
}

/// Name of the response-body node an endpoint maps to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingType {
    /// The response carries nothing worth mapping.
    #[default]
    NoContent,
    /// The payload lives at `body[name]`.
    Node(String),
}

impl MappingType {
    /// Mapping onto the body node `name`.
    #[must_use]
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Body key of the mapped node, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            MappingType::NoContent => None,
            MappingType::Node(name) => Some(name),
        }
    }
}

/// Description of a single API call (the request "target").
///
/// # Example
///
/// ```
/// use ello_core::endpoint::{Endpoint, MappingType, TokenRequirement};
///
/// let endpoint = Endpoint::get("/api/v2/following/posts/recent")
///     .with_mapping(MappingType::node("posts"))
///     .with_paging_path("posts")
///     .with_parameter("per_page", 10)
///     .with_token_requirement(TokenRequirement::Anonymous);
///
/// assert_eq!(endpoint.paging_path(), Some("posts"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    path: String,
    method: Method,
    parameters: Map<String, Value>,
    encoding: ParameterEncoding,
    headers: Vec<(String, String)>,
    mapping: MappingType,
    paging_path: Option<String>,
    sample_response: Vec<u8>,
    token_requirement: TokenRequirement,
    route: NetworkRoute,
}

impl Endpoint {
    /// Endpoint with the given method and path and default settings.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            parameters: Map::new(),
            encoding: ParameterEncoding::default(),
            headers: Vec::new(),
            mapping: MappingType::default(),
            paging_path: None,
            sample_response: Vec::new(),
            token_requirement: TokenRequirement::default(),
            route: NetworkRoute::default(),
        }
    }

    /// GET endpoint.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST endpoint with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path).with_encoding(ParameterEncoding::Json)
    }

    /// PUT endpoint with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path).with_encoding(ParameterEncoding::Json)
    }

    /// PATCH endpoint with a JSON body.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path).with_encoding(ParameterEncoding::Json)
    }

    /// DELETE endpoint.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the parameter encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Add a required header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body node the response maps to.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingType) -> Self {
        self.mapping = mapping;
        self
    }

    /// Set the key under `links` that carries body pagination.
    #[must_use]
    pub fn with_paging_path(mut self, paging_path: impl Into<String>) -> Self {
        self.paging_path = Some(paging_path.into());
        self
    }

    /// Set the canned response served by stubbing transports.
    #[must_use]
    pub fn with_sample_response(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.sample_response = body.into();
        self
    }

    /// Set the token requirement.
    #[must_use]
    pub const fn with_token_requirement(mut self, requirement: TokenRequirement) -> Self {
        self.token_requirement = requirement;
        self
    }

    /// Select the network configuration that carries the request.
    #[must_use]
    pub const fn with_route(mut self, route: NetworkRoute) -> Self {
        self.route = route;
        self
    }

    /// Path (or absolute URL) of the endpoint.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full URL of the endpoint, resolved against `base`.
    ///
    /// Absolute paths are used verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the path cannot be joined onto `base`.
    pub fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
        match Url::parse(&self.path) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => base.join(&self.path),
            Err(error) => Err(error),
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Parameter encoding.
    #[must_use]
    pub const fn encoding(&self) -> ParameterEncoding {
        self.encoding
    }

    /// Required headers.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Response mapping.
    #[must_use]
    pub const fn mapping(&self) -> &MappingType {
        &self.mapping
    }

    /// Key under `links` that carries body pagination.
    #[must_use]
    pub fn paging_path(&self) -> Option<&str> {
        self.paging_path.as_deref()
    }

    /// Canned response body.
    #[must_use]
    pub fn sample_response(&self) -> &[u8] {
        &self.sample_response
    }

    /// Token requirement.
    #[must_use]
    pub const fn token_requirement(&self) -> TokenRequirement {
        self.token_requirement
    }

    /// Network route.
    #[must_use]
    pub const fn route(&self) -> NetworkRoute {
        self.route
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
