//! Local development server.
//!
//! Accepts TCP connections, reads HTTP/1.1 requests, and feeds each one to a shared
//! [`Dispatcher`] as if an API gateway had delivered it. Both `path` and `resource` are set
//! to the literal request path, so either routing mode works locally. Supports HTTP/1.1
//! persistent connections (keep-alive).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::gateway::{GatewayRequest, GatewayResponse, QueryParams, QueryValue};
use crate::http::{
    StatusCode,
    request::{ParseError, Request},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Serves a [`Dispatcher`] over plain HTTP for local development.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use lambda_page::dispatch::Dispatcher;
/// use lambda_page::gateway::{GatewayRequest, Reply};
/// use lambda_page::router::{EndpointOptions, HandlerError};
/// use lambda_page::server::Server;
///
/// async fn hello(_req: GatewayRequest) -> Result<Reply, HandlerError> {
///     Ok(Reply::body("Hello!"))
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut dispatcher = Dispatcher::new();
///     dispatcher.add_endpoint("get", "/", hello, EndpointOptions::default());
///
///     let server = Server::bind("127.0.0.1:9000").await?;
///     server.serve(Arc::new(dispatcher)).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the process ends, dispatching every request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr,
            endpoints = dispatcher.registry().len(),
            routing = ?dispatcher.routing(),
            "local server listening"
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = Arc::clone(&dispatcher);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, dispatcher).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(ParseError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let body = Bytes::copy_from_slice(&buf[body_offset..total_needed]);
        let request = request.with_body(body);

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = match dispatcher.handle(to_gateway_request(request)).await {
            Ok(response) => to_wire_response(response),
            Err(e) => {
                error!(peer = %peer_addr, error = %e, "request failed, sending 500");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        };
        stream
            .write_all(&response.keep_alive(keep_alive).into_bytes())
            .await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

/// Builds the canonical request a gateway would have delivered for `request`.
fn to_gateway_request(request: Request) -> GatewayRequest {
    let query = query_params(request.query_pairs());
    let mut gateway = GatewayRequest::new(request.method())
        .with_path(request.path())
        .with_resource(request.path())
        .with_headers(request.headers().clone())
        .with_query_params(query);

    let body = request.into_body();
    if !body.is_empty() {
        gateway = gateway.with_body(body);
    }
    gateway
}

/// Groups query pairs by name; a name seen more than once becomes a list.
fn query_params(pairs: Vec<(String, String)>) -> Option<QueryParams> {
    if pairs.is_empty() {
        return None;
    }

    let mut params = QueryParams::new();
    for (name, value) in pairs {
        match params.remove(&name) {
            None => {
                params.insert(name, QueryValue::One(value));
            }
            Some(QueryValue::One(first)) => {
                params.insert(name, QueryValue::Many(vec![first, value]));
            }
            Some(QueryValue::Many(mut values)) => {
                values.push(value);
                params.insert(name, QueryValue::Many(values));
            }
        }
    }
    Some(params)
}

fn to_wire_response(response: GatewayResponse) -> Response {
    let (status, headers, body) = response.into_parts();
    let mut wire = Response::new(status);
    for (name, value) in headers.iter() {
        wire = wire.header(name, value);
    }
    match body {
        Some(body) => wire.body_bytes(body.into_bytes()),
        None => wire,
    }
}
