//! Endpoint registry — map an exact `(method, path)` pair to a handler and its response
//! metadata.
//!
//! Matching is exact: the path is compared byte for byte (case-sensitive, no pattern
//! syntax, no trailing-slash folding) and the method case-insensitively. Each registration
//! is an [`Endpoint`] record holding the handler alongside its content type and caching
//! flag, so one handler can be registered under several pairs with different metadata.
//!
//! Registration needs `&mut Registry` and lookup only `&Registry`: the registry is built at
//! startup and then shared read-only while requests are served.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use crate::gateway::{DEFAULT_CONTENT_TYPE, GatewayRequest, Reply};

/// Error type handlers fail with. It reaches the adapter unchanged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply, HandlerError>> + Send>>;

/// Type-erased, reference-counted async handler.
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so the same handler can back several
/// endpoints and be shared across threads without copying the closure. Build one with
/// [`handler_fn`], or let [`Dispatcher::add_endpoint`](crate::dispatch::Dispatcher::add_endpoint)
/// do it for you.
pub type Handler = Arc<dyn Fn(GatewayRequest) -> HandlerFuture + Send + Sync + 'static>;

/// Erases an async function into a [`Handler`].
///
/// # Examples
///
/// ```rust
/// use lambda_page::gateway::{GatewayRequest, Reply};
/// use lambda_page::router::{HandlerError, handler_fn};
///
/// async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
///     Ok(Reply::body("hello"))
/// }
///
/// let handler = handler_fn(hello);
/// let shared = handler.clone();
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    Arc::new(move |request: GatewayRequest| -> HandlerFuture { Box::pin(f(request)) })
}

/// Response metadata supplied at registration time.
///
/// Defaults to `application/json` with caching disabled.
///
/// # Examples
///
/// ```rust
/// use lambda_page::router::EndpointOptions;
///
/// let options = EndpointOptions::new().content_type("text/html").cached();
/// assert_eq!(options.content_type_str(), "text/html");
/// assert!(options.caching_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOptions {
    content_type: String,
    caching_enabled: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointOptions {
    /// `application/json`, caching disabled.
    pub fn new() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            caching_enabled: false,
        }
    }

    /// Sets the content type every response from this endpoint carries.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Enables response caching for this endpoint.
    #[must_use]
    pub fn cached(self) -> Self {
        self.caching(true)
    }

    /// Enables or disables response caching for this endpoint.
    #[must_use]
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Returns the declared content type.
    pub fn content_type_str(&self) -> &str {
        &self.content_type
    }

    /// Returns `true` if replies from this endpoint may be cached.
    pub fn caching_enabled(&self) -> bool {
        self.caching_enabled
    }
}

/// A registration record: the handler plus the metadata it was registered with.
#[derive(Clone)]
pub struct Endpoint {
    handler: Handler,
    options: EndpointOptions,
}

impl Endpoint {
    /// Returns the registered handler; clone it to register the same handler elsewhere.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Returns the content type every reply from this endpoint is normalized with.
    pub fn content_type(&self) -> &str {
        self.options.content_type_str()
    }

    /// Returns `true` if the dispatcher consults the cache for this endpoint.
    pub fn caching_enabled(&self) -> bool {
        self.options.caching_enabled()
    }

    /// Invokes the handler.
    pub fn call(&self, request: GatewayRequest) -> HandlerFuture {
        (self.handler)(request)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("content_type", &self.content_type())
            .field("caching_enabled", &self.caching_enabled())
            .finish_non_exhaustive()
    }
}

/// Exact-match endpoint table keyed by path, then lowercased method.
///
/// # Examples
///
/// ```rust
/// use lambda_page::gateway::{GatewayRequest, Reply};
/// use lambda_page::router::{EndpointOptions, HandlerError, Registry, handler_fn};
///
/// async fn ping(_req: GatewayRequest) -> Result<Reply, HandlerError> {
///     Ok(Reply::body("pong"))
/// }
///
/// let mut registry = Registry::new();
/// registry.register("GET", "/ping", handler_fn(ping), EndpointOptions::default());
///
/// assert!(registry.lookup("get", "/ping").is_some());
/// assert!(registry.lookup("get", "/PING").is_none());
/// ```
#[derive(Default)]
pub struct Registry {
    endpoints: HashMap<String, HashMap<String, Endpoint>>,
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(method, path)`, replacing any previous registration of the
    /// same pair entirely.
    pub fn register(
        &mut self,
        method: &str,
        path: impl Into<String>,
        handler: Handler,
        options: EndpointOptions,
    ) {
        self.endpoints
            .entry(path.into())
            .or_default()
            .insert(method.to_ascii_lowercase(), Endpoint { handler, options });
    }

    /// Finds the endpoint registered for `(method, path)`. A miss is not an error.
    pub fn lookup(&self, method: &str, path: &str) -> Option<&Endpoint> {
        let by_method = self.endpoints.get(path)?;
        match by_method.get(method) {
            Some(endpoint) => Some(endpoint),
            None => by_method.get(&method.to_ascii_lowercase()),
        }
    }

    /// Iterates over registered `(method, path)` pairs in no particular order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.endpoints.iter().flat_map(|(path, by_method)| {
            by_method
                .keys()
                .map(move |method| (method.as_str(), path.as_str()))
        })
    }

    /// Return the number of registered `(method, path)` pairs.
    pub fn len(&self) -> usize {
        self.endpoints.values().map(HashMap::len).sum()
    }

    /// Return `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes()).finish()
    }
}
