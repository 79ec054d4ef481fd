//! Canonical request and response shapes shared by every adapter.
//!
//! Adapters translate their host protocol into a [`GatewayRequest`], hand it to the
//! [`Dispatcher`](crate::dispatch::Dispatcher), and translate the resulting
//! [`GatewayResponse`] back. Two adapters ship with the crate: the serverless proxy event
//! adapter in [`event`] and the local development [`server`](crate::server).

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::Headers;

pub mod event;
pub mod response;

pub use response::{GatewayResponse, Reply, ResponseBody};

/// Content type endpoints declare unless registered otherwise.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Which request field drives routing and cache keys for a deployment.
///
/// Serverless gateways report both the literal `path` and the parameterized `resource`
/// template; a deployment picks one and uses it consistently. The local development server
/// sets both to the literal path, so either mode works there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Route on the literal request path, e.g. `/users/42`.
    #[default]
    Path,
    /// Route on the resource template, e.g. `/users/{id}`.
    Resource,
}

/// A request that cannot be dispatched because a field it needs is missing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A single query parameter value: gateways send either one string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    /// The first value, which is what most handlers want.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::One(value) => Some(value),
            QueryValue::Many(values) => values.first().map(String::as_str),
        }
    }
}

/// Query parameters, kept sorted by name.
pub type QueryParams = BTreeMap<String, QueryValue>;

/// Request body as delivered by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
}

impl Body {
    /// The body as text; binary bodies are decoded as UTF-8, replacing invalid sequences.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Body::Text(text) => Cow::Borrowed(text),
            Body::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// The body as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(bytes))
    }
}

/// The adapter-agnostic request the dispatcher consumes.
///
/// The method is lowercased on construction. Routing fields are optional because which one
/// is required depends on the deployment's [`RoutingMode`]; use
/// [`routing_key`](Self::routing_key) to resolve it.
///
/// # Examples
///
/// ```
/// use lambda_page::gateway::{GatewayRequest, RoutingMode};
///
/// let request = GatewayRequest::new("GET")
///     .with_path("/users/42")
///     .with_resource("/users/{id}")
///     .with_query("verbose", "true");
///
/// assert_eq!(request.method(), "get");
/// assert_eq!(request.routing_key(RoutingMode::Resource), Ok("/users/{id}"));
/// assert_eq!(request.query_param("verbose"), Some("true"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    method: String,
    path: Option<String>,
    resource: Option<String>,
    headers: Headers,
    query: Option<QueryParams>,
    body: Option<Body>,
    path_parameters: Option<HashMap<String, String>>,
}

impl GatewayRequest {
    /// Creates a request for `method` with no routing fields, headers, query, or body.
    pub fn new(method: impl AsRef<str>) -> Self {
        Self {
            method: method.as_ref().to_ascii_lowercase(),
            path: None,
            resource: None,
            headers: Headers::new(),
            query: None,
            body: None,
            path_parameters: None,
        }
    }

    /// Sets the literal request path, e.g. `/users/42`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the resource template the gateway matched, e.g. `/users/{id}`.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets a header, replacing any value with the same (case-insensitive) name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a single-valued query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .get_or_insert_with(QueryParams::new)
            .insert(name.into(), QueryValue::One(value.into()));
        self
    }

    /// Replaces the whole query parameter map; `None` means the adapter saw no query.
    #[must_use]
    pub fn with_query_params(mut self, query: Option<QueryParams>) -> Self {
        self.query = query;
        self
    }

    /// Attaches a body. Strings become [`Body::Text`]; byte buffers become [`Body::Binary`].
    ///
    /// # Examples
    ///
    /// ```
    /// use lambda_page::gateway::{Body, GatewayRequest};
    ///
    /// let text = GatewayRequest::new("post").with_body("hi");
    /// assert_eq!(text.body(), Some(&Body::Text("hi".to_owned())));
    ///
    /// let bytes = GatewayRequest::new("post").with_body(vec![0xde, 0xad]);
    /// assert_eq!(bytes.body().map(Body::as_bytes), Some(&[0xde, 0xad][..]));
    /// ```
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds one path parameter, as a gateway would after matching a resource template.
    #[must_use]
    pub fn with_path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replaces all path parameters; `None` means the adapter extracted none.
    #[must_use]
    pub fn with_path_parameters(mut self, params: Option<HashMap<String, String>>) -> Self {
        self.path_parameters = params;
        self
    }

    /// Returns the lowercased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the literal request path, if the adapter supplied one.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the resource template, if the adapter supplied one.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Resolves the routing key for the given deployment mode.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingField`] when the field the mode routes on is absent.
    pub fn routing_key(&self, mode: RoutingMode) -> Result<&str, RequestError> {
        match mode {
            RoutingMode::Path => self
                .path
                .as_deref()
                .ok_or(RequestError::MissingField { field: "path" }),
            RoutingMode::Resource => self
                .resource
                .as_deref()
                .ok_or(RequestError::MissingField { field: "resource" }),
        }
    }

    /// Returns all request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the query parameter map, or `None` when the request carried no query.
    pub fn query(&self) -> Option<&QueryParams> {
        self.query.as_ref()
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_ref()?.get(name)?.first()
    }

    /// Returns the body, or `None` when the request carried none.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Returns the body decoded as text, if any.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_ref().map(Body::as_text)
    }

    /// Deserializes the body as JSON.
    ///
    /// An absent body is treated as empty input and fails to parse.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.body.as_ref().map(Body::as_bytes).unwrap_or_default();
        serde_json::from_slice(bytes)
    }

    /// Returns the path parameters the adapter extracted, if any.
    pub fn path_parameters(&self) -> Option<&HashMap<String, String>> {
        self.path_parameters.as_ref()
    }

    /// Returns a path parameter extracted by the adapter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_parameters.as_ref()?.get(name).map(String::as_str)
    }
}
