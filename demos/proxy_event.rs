//! Runs proxy events through a dispatcher the way a serverless function would.
//!
//! ```text
//! cargo run --example proxy_event                  # built-in sample event, sent twice
//! cargo run --example proxy_event -- event.json    # an event captured from the gateway
//! ```
//!
//! The second sample invocation is answered from the cache.

use std::sync::atomic::{AtomicUsize, Ordering};

use lambda_page::cache::{MemoryObjectStore, ObjectCache};
use lambda_page::gateway::event::handle_event;
use lambda_page::{Dispatcher, EndpointOptions, GatewayRequest, HandlerError, PageConfig, Reply};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

static INVOCATIONS: AtomicUsize = AtomicUsize::new(0);

async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
    let n = INVOCATIONS.fetch_add(1, Ordering::SeqCst) + 1;
    info!(invocation = n, "hello handler invoked");
    Ok(Reply::with_status(200, r#"{"message": "hello world"}"#))
}

fn sample_event() -> Value {
    json!({
        "httpMethod": "GET",
        "path": "/",
        "resource": "/",
        "headers": {"Accept": "application/json"},
        "queryStringParameters": null,
        "pathParameters": null,
        "body": null,
        "isBase64Encoded": false
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
                .add_directive("lambda_page=debug".parse()?),
        )
        .init();

    // Built once per function instance and reused across invocations.
    let config = PageConfig::load()?;
    let cache = ObjectCache::from_settings(MemoryObjectStore::new(), &config.cache);
    let mut dispatcher = Dispatcher::from_config(&config).with_cache(cache);
    dispatcher.add_endpoint("get", "/", hello, EndpointOptions::new().cached());

    let events = match std::env::args().nth(1) {
        Some(path) => vec![serde_json::from_str(&tokio::fs::read_to_string(path).await?)?],
        None => vec![sample_event(), sample_event()],
    };

    for event in events {
        let response = handle_event(&dispatcher, event).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}
