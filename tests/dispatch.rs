//! End-to-end dispatch behavior: registry, caching, and response normalization together.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use lambda_page::cache::{CacheStore, ManualClock, MemoryObjectStore, ObjectCache};
use lambda_page::gateway::event::handle_event;
use lambda_page::{
    CacheKey, DispatchError, Dispatcher, EndpointOptions, GatewayRequest, HandlerError, Reply,
    ResponseBody, RoutingMode,
};
use serde_json::{Value, json};

const T0: i64 = 1_700_000_000;
const MAX_AGE: u64 = 300;

fn get(path: &str) -> GatewayRequest {
    GatewayRequest::new("GET").with_path(path)
}

/// A dispatcher over an in-memory cache driven by a manual clock.
struct Harness {
    clock: Arc<ManualClock>,
    objects: MemoryObjectStore,
    dispatcher: Dispatcher,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::at_timestamp(T0));
        let objects = MemoryObjectStore::with_clock(clock.clone());
        let cache = ObjectCache::new(objects.clone())
            .with_max_age(MAX_AGE)
            .with_clock(clock.clone());
        Self {
            clock,
            objects,
            dispatcher: Dispatcher::new().with_cache(cache),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers a counting handler answering `reply` under `GET path`.
    fn register(&mut self, path: &str, reply: Reply, options: EndpointOptions) {
        let calls = self.calls.clone();
        self.dispatcher.add_endpoint(
            "get",
            path,
            move |_req| {
                let calls = calls.clone();
                let reply = reply.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(reply)
                }
            },
            options,
        );
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn bare_body_defaults_to_200_json() {
    let mut h = Harness::new();
    h.register("/", Reply::body(json!({"message": "hello"})), EndpointOptions::default());

    let response = h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(
        response.body(),
        Some(&ResponseBody::Text(r#"{"message": "hello"}"#.to_owned()))
    );
    let decoded: Value = serde_json::from_slice(response.body().unwrap().as_bytes()).unwrap();
    assert_eq!(decoded, json!({"message": "hello"}));
}

#[tokio::test]
async fn cached_reply_served_within_window() {
    let mut h = Harness::new();
    h.register("/", Reply::with_status(201, "created"), EndpointOptions::new().cached());

    let first = h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(h.calls(), 1);
    assert_eq!(h.objects.len(), 1);

    h.clock.advance(MAX_AGE as i64 - 1);
    let second = h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(h.calls(), 1);
    assert_eq!(second.status_code(), 201);
    assert_eq!(second.body(), Some(&ResponseBody::Text("created".to_owned())));
    assert_eq!(first, second);
}

#[tokio::test]
async fn expired_entry_reinvokes_handler_and_overwrites() {
    let mut h = Harness::new();
    h.register("/", Reply::with_status(201, "created"), EndpointOptions::new().cached());

    h.dispatcher.handle(get("/")).await.unwrap();
    h.clock.advance(MAX_AGE as i64 + 1);

    let response = h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(h.calls(), 2);
    assert_eq!(response.status_code(), 201);

    // The rewrite restarted the window: one more request inside it stays cached.
    h.clock.advance(MAX_AGE as i64);
    h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(h.calls(), 2);
    assert_eq!(h.objects.len(), 1);
}

#[tokio::test]
async fn non_json_content_type_yields_bytes() {
    let mut h = Harness::new();
    h.register(
        "/page",
        Reply::body(json!({"title": "home"})),
        EndpointOptions::new().content_type("text/html"),
    );

    let response = h.dispatcher.handle(get("/page")).await.unwrap();
    assert_eq!(response.content_type(), Some("text/html"));
    assert_eq!(
        response.body(),
        Some(&ResponseBody::Binary(Bytes::from_static(br#"{"title": "home"}"#)))
    );
}

#[tokio::test]
async fn unregistered_routes_are_404_with_or_without_caching() {
    let mut h = Harness::new();
    h.register("/cached", Reply::body("x"), EndpointOptions::new().cached());

    for dispatcher in [&h.dispatcher, &Dispatcher::new()] {
        let response = dispatcher.handle(get("/missing")).await.unwrap();
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body(), None);
        assert!(response.headers().is_empty());
    }
    assert_eq!(h.calls(), 0);
    assert!(h.objects.is_empty());
}

#[tokio::test]
async fn headers_do_not_split_cache_entries() {
    let mut h = Harness::new();
    h.register("/", Reply::body("same"), EndpointOptions::new().cached());

    h.dispatcher
        .handle(get("/").with_header("User-Agent", "a"))
        .await
        .unwrap();
    h.dispatcher
        .handle(get("/").with_header("User-Agent", "b"))
        .await
        .unwrap();
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn body_and_query_split_cache_entries() {
    let mut h = Harness::new();
    h.register("/", Reply::body("same"), EndpointOptions::new().cached());

    h.dispatcher.handle(get("/")).await.unwrap();
    h.dispatcher.handle(get("/").with_query("page", "2")).await.unwrap();
    h.dispatcher.handle(get("/").with_body("payload")).await.unwrap();
    assert_eq!(h.calls(), 3);
    assert_eq!(h.objects.len(), 3);
}

#[tokio::test]
async fn cached_and_direct_replies_normalize_identically() {
    let reply = Reply::with_status(202, json!({"items": [1, 2], "next": null}));
    let options = EndpointOptions::new().content_type("text/plain").cached();

    let mut h = Harness::new();
    h.register("/", reply.clone(), options);
    let direct = h.dispatcher.handle(get("/")).await.unwrap();
    let cached = h.dispatcher.handle(get("/")).await.unwrap();

    assert_eq!(h.calls(), 1);
    assert_eq!(direct, cached);
    assert_eq!(direct, reply.into_response("text/plain"));
}

#[tokio::test]
async fn cached_floats_and_member_order_match_direct_text() {
    let reply = Reply::body(json!({
        "zeta": 1.0715660391465826e-75,
        "alpha": 0.30000000000000004,
        "mid": [2.5, -0.1, 1e300],
        "name": "pi",
        "value": std::f64::consts::PI
    }));

    let mut h = Harness::new();
    h.register("/", reply.clone(), EndpointOptions::new().cached());
    let direct = h.dispatcher.handle(get("/")).await.unwrap();
    let cached = h.dispatcher.handle(get("/")).await.unwrap();

    assert_eq!(h.calls(), 1);
    assert_eq!(direct, cached);
    assert_eq!(
        cached.body(),
        Some(&ResponseBody::Text(
            r#"{"zeta": 1.0715660391465826e-75, "alpha": 0.30000000000000004, "mid": [2.5, -0.1, 1e300], "name": "pi", "value": 3.141592653589793}"#
                .to_owned()
        ))
    );
}

#[tokio::test]
async fn cache_round_trip_preserves_reply() {
    let h = Harness::new();
    let cache = ObjectCache::new(h.objects.clone()).with_clock(h.clock.clone());
    let key = CacheKey::derive("/", &get("/"));

    let replies = [
        Reply::with_status(200, json!([200, "looks like a pair"])),
        Reply::body(json!({"b": 1.0715660391465826e-75, "a": 5e-324, "c": 1.7976931348623157e308})),
        Reply::body(json!([0.1, 0.2, 0.30000000000000004, -2.2250738585072014e-308])),
    ];
    for reply in replies {
        cache.store(&key, &reply).await.unwrap();
        let back = cache.retrieve(&key).await.unwrap();
        assert_eq!(back, reply);
        assert_eq!(
            back.into_response("application/json"),
            reply.into_response("application/json")
        );
    }
}

#[tokio::test]
async fn handler_failure_reaches_the_caller_and_is_not_cached() {
    let mut h = Harness::new();
    h.dispatcher.add_endpoint(
        "get",
        "/",
        |_req| async { Err::<Reply, HandlerError>("upstream timed out".into()) },
        EndpointOptions::new().cached(),
    );

    let err = h.dispatcher.handle(get("/")).await.unwrap_err();
    assert!(matches!(err, DispatchError::Handler(_)));
    assert_eq!(err.to_string(), "upstream timed out");
    assert!(h.objects.is_empty());
}

#[tokio::test]
async fn reregistration_replaces_metadata() {
    let mut h = Harness::new();
    h.register("/", Reply::body("v1"), EndpointOptions::new().cached());
    h.register("/", Reply::body("v2"), EndpointOptions::new().content_type("text/plain"));

    let response = h.dispatcher.handle(get("/")).await.unwrap();
    assert_eq!(response.content_type(), Some("text/plain"));
    assert_eq!(
        response.body(),
        Some(&ResponseBody::Binary(Bytes::from_static(b"v2")))
    );
    assert!(h.objects.is_empty());
}

#[tokio::test]
async fn one_handler_under_several_routes() {
    async fn shared(req: GatewayRequest) -> Result<Reply, HandlerError> {
        Ok(Reply::body(req.path().unwrap_or_default().to_owned()))
    }

    let mut dispatcher = Dispatcher::new();
    dispatcher.add_endpoint("get", "/a", shared, EndpointOptions::default());
    dispatcher.add_endpoint("get", "/b", shared, EndpointOptions::new().content_type("text/plain"));

    let a = dispatcher.handle(get("/a")).await.unwrap();
    let b = dispatcher.handle(get("/b")).await.unwrap();
    assert_eq!(a.body(), Some(&ResponseBody::Text("/a".to_owned())));
    assert_eq!(b.body(), Some(&ResponseBody::Binary(Bytes::from_static(b"/b"))));
}

#[tokio::test]
async fn proxy_event_end_to_end_in_resource_mode() {
    async fn item(req: GatewayRequest) -> Result<Reply, HandlerError> {
        Ok(Reply::body(json!({"id": req.path_param("id")})))
    }

    let mut dispatcher = Dispatcher::new().with_routing(RoutingMode::Resource);
    dispatcher.add_endpoint("get", "/items/{id}", item, EndpointOptions::default());

    let event = json!({
        "httpMethod": "GET",
        "path": "/items/42",
        "resource": "/items/{id}",
        "headers": {"Accept": "application/json"},
        "queryStringParameters": null,
        "pathParameters": {"id": "42"},
        "body": null,
        "isBase64Encoded": false
    });

    let response = handle_event(&dispatcher, event).await.unwrap();
    assert_eq!(response["statusCode"], 200);
    assert_eq!(response["body"], r#"{"id": "42"}"#);
    assert_eq!(response["isBase64Encoded"], false);
}
