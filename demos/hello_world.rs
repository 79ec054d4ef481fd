//! Serves a cached hello-world page on the local development server.
//!
//! ```text
//! cargo run --example hello_world
//! curl http://127.0.0.1:9000/
//! curl 'http://127.0.0.1:9000/greet?name=ferris'
//! ```
//!
//! Override settings with `LAMBDA_PAGE_SERVER__ADDRESS=0.0.0.0:8080` or
//! `LAMBDA_PAGE_CACHE__MAX_AGE_SECS=10`.

use std::sync::Arc;

use lambda_page::{
    Dispatcher, EndpointOptions, GatewayRequest, HandlerError, MemoryObjectStore, ObjectCache,
    PageConfig, Reply, Server,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
    Ok(Reply::body(json!({"message": "hello"})))
}

async fn greet(req: GatewayRequest) -> Result<Reply, HandlerError> {
    match req.query_param("name") {
        Some(name) => Ok(Reply::body(format!("<h1>Hello, {}!</h1>", escape_html(name)))),
        None => Ok(Reply::with_status(400, "<h1>Who are you?</h1>")),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
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

    let config = PageConfig::load()?;
    let cache = ObjectCache::from_settings(MemoryObjectStore::new(), &config.cache);

    let mut dispatcher = Dispatcher::from_config(&config).with_cache(cache);
    dispatcher.add_endpoint("get", "/", hello, EndpointOptions::new().cached());
    dispatcher.add_endpoint(
        "get",
        "/greet",
        greet,
        EndpointOptions::new().content_type("text/html"),
    );

    let server = Server::bind(&config.server.address).await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(Arc::new(dispatcher)).await?;
    Ok(())
}
