//! # lambda-page
//!
//! A micro-framework for serving pages from a serverless function behind an API gateway.
//!
//! Register async handlers against exact `(method, path)` pairs, optionally cache their
//! replies in an object store for a fixed window, and let the dispatcher normalize every
//! reply into the gateway's response shape. The same dispatcher runs inside the function
//! (see [`gateway::event::handle_event`]) and on a local development server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lambda_page::{Dispatcher, EndpointOptions, GatewayRequest, HandlerError, Reply, Server};
//! use serde_json::json;
//!
//! async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
//!     Ok(Reply::body(json!({"message": "hello"})))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut dispatcher = Dispatcher::new();
//!     dispatcher.add_endpoint("get", "/", hello, EndpointOptions::default());
//!
//!     let server = Server::bind("127.0.0.1:9000").await?;
//!     println!("Listening on http://127.0.0.1:9000");
//!     server.serve(Arc::new(dispatcher)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod http;
pub mod router;
pub mod server;

pub use cache::{CacheKey, CacheStore, MemoryObjectStore, ObjectCache, ObjectStore};
pub use config::PageConfig;
pub use dispatch::{DispatchError, Dispatcher};
pub use gateway::{GatewayRequest, GatewayResponse, Reply, ResponseBody, RoutingMode};
pub use router::{EndpointOptions, HandlerError};
pub use server::{Server, ServerError};
