//! Request dispatch: the path from a canonical request to a normalized response.
//!
//! [`Dispatcher::handle`] is a single pass with no retries:
//!
//! 1. resolve the routing key for the deployment's [`RoutingMode`],
//! 2. look the endpoint up; a miss answers `404` with no body and no content type,
//! 3. when a cache is configured and the endpoint caches, try the cache,
//! 4. on a miss (or without caching) run the handler, and store its raw [`Reply`] when
//!    caching applies,
//! 5. normalize the reply with the endpoint's declared content type.
//!
//! Cache faults never fail a request. Handler errors are not caught: they come back as
//! [`DispatchError::Handler`] for the adapter to turn into a transport-level failure.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::PageConfig;
use crate::gateway::{GatewayRequest, GatewayResponse, Reply, RequestError, RoutingMode};
use crate::router::{EndpointOptions, Handler, HandlerError, Registry, handler_fn};

/// Why a request produced no response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request lacks the field the deployment routes on.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The handler failed; the error is the handler's own, untouched.
    #[error(transparent)]
    Handler(HandlerError),
}

/// Routes canonical requests to registered handlers, with optional response caching.
///
/// Endpoints are added through `&mut self` during startup; [`handle`](Self::handle) only
/// needs `&self`, so a configured dispatcher can be shared behind an [`Arc`].
///
/// # Examples
///
/// ```rust
/// use lambda_page::dispatch::Dispatcher;
/// use lambda_page::gateway::{GatewayRequest, Reply};
/// use lambda_page::router::{EndpointOptions, HandlerError};
/// use serde_json::json;
///
/// async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
///     Ok(Reply::body(json!({"message": "hello"})))
/// }
///
/// # async fn run() {
/// let mut dispatcher = Dispatcher::new();
/// dispatcher.add_endpoint("GET", "/", hello, EndpointOptions::default());
///
/// let response = dispatcher
///     .handle(GatewayRequest::new("GET").with_path("/"))
///     .await
///     .unwrap();
/// assert_eq!(response.status_code(), 200);
/// # }
/// ```
#[derive(Default)]
pub struct Dispatcher {
    registry: Registry,
    cache: Option<Arc<dyn CacheStore>>,
    routing: RoutingMode,
}

impl Dispatcher {
    /// A dispatcher with no endpoints, no cache, routing on the literal path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher routing as `config` says. The cache backend is attached separately.
    pub fn from_config(config: &PageConfig) -> Self {
        Self::new().with_routing(config.routing)
    }

    /// Selects which request field drives routing and cache keys.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lambda_page::dispatch::Dispatcher;
    /// use lambda_page::gateway::RoutingMode;
    ///
    /// let dispatcher = Dispatcher::new().with_routing(RoutingMode::Resource);
    /// assert_eq!(dispatcher.routing(), RoutingMode::Resource);
    /// ```
    #[must_use]
    pub fn with_routing(mut self, routing: RoutingMode) -> Self {
        self.routing = routing;
        self
    }

    /// Attaches a cache used by endpoints registered with caching enabled.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lambda_page::cache::{MemoryObjectStore, ObjectCache};
    /// use lambda_page::dispatch::Dispatcher;
    ///
    /// let dispatcher = Dispatcher::new().with_cache(ObjectCache::new(MemoryObjectStore::new()));
    /// assert!(dispatcher.has_cache());
    /// ```
    #[must_use]
    pub fn with_cache(self, cache: impl CacheStore + 'static) -> Self {
        self.with_shared_cache(Arc::new(cache))
    }

    /// Attaches a cache that is also referenced elsewhere.
    #[must_use]
    pub fn with_shared_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers an async function for `(method, path)`, replacing any earlier registration.
    pub fn add_endpoint<F, Fut>(
        &mut self,
        method: &str,
        path: impl Into<String>,
        handler: F,
        options: EndpointOptions,
    ) where
        F: Fn(GatewayRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.add_handler(method, path, handler_fn(handler), options);
    }

    /// Registers an already type-erased [`Handler`], e.g. one shared between endpoints.
    pub fn add_handler(
        &mut self,
        method: &str,
        path: impl Into<String>,
        handler: Handler,
        options: EndpointOptions,
    ) {
        self.registry.register(method, path, handler, options);
    }

    /// Returns the endpoint registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the deployment's routing mode.
    pub fn routing(&self) -> RoutingMode {
        self.routing
    }

    /// Returns `true` if a cache is attached.
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Produces the response for `request`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Request`] when the routing field for this deployment is missing.
    /// - [`DispatchError::Handler`] when the matched handler fails.
    pub async fn handle(&self, request: GatewayRequest) -> Result<GatewayResponse, DispatchError> {
        let route = request.routing_key(self.routing)?;

        let Some(endpoint) = self.registry.lookup(request.method(), route) else {
            debug!(method = request.method(), route, "no endpoint registered");
            return Ok(GatewayResponse::not_found());
        };

        let cache = self
            .cache
            .as_deref()
            .filter(|_| endpoint.caching_enabled());

        let reply = match cache {
            Some(cache) => {
                let key = CacheKey::derive(route, &request);
                match cache.retrieve(&key).await {
                    Some(reply) => {
                        info!(%key, method = request.method(), route, "cache hit");
                        reply
                    }
                    None => {
                        let reply = endpoint.call(request).await.map_err(DispatchError::Handler)?;
                        if let Err(e) = cache.store(&key, &reply).await {
                            warn!(%key, error = %e, "failed to store reply in cache");
                        }
                        reply
                    }
                }
            }
            None => endpoint.call(request).await.map_err(DispatchError::Handler)?,
        };

        Ok(reply.into_response(endpoint.content_type()))
    }
}
