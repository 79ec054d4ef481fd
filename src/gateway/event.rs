//! Serverless proxy event adapter.
//!
//! Translates the JSON event a serverless HTTP gateway delivers into a [`GatewayRequest`]
//! and a [`GatewayResponse`] back into the JSON the gateway expects. Binary bodies travel
//! base64-encoded with `isBase64Encoded: true`.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use super::{Body, GatewayRequest, GatewayResponse, QueryParams, ResponseBody};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::http::Headers;

/// Errors raised while translating a proxy event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed proxy event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("proxy event body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Request(#[from] super::RequestError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyEvent {
    http_method: String,
    path: Option<String>,
    resource: Option<String>,
    headers: Option<HashMap<String, String>>,
    query_string_parameters: Option<QueryParams>,
    body: Option<String>,
    #[serde(default)]
    is_base64_encoded: bool,
    path_parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyResponse<'a> {
    status_code: u16,
    headers: HashMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    is_base64_encoded: bool,
}

/// Parses a proxy event into a canonical request.
///
/// # Errors
///
/// - [`EventError::Malformed`] when `httpMethod` is missing or a field has the wrong type.
/// - [`EventError::Base64`] when `isBase64Encoded` is set and the body doesn't decode.
pub fn parse_event(event: Value) -> Result<GatewayRequest, EventError> {
    let event: ProxyEvent = serde_json::from_value(event)?;

    let body = match event.body {
        Some(encoded) if event.is_base64_encoded => Some(Body::from(STANDARD.decode(encoded)?)),
        Some(text) => Some(Body::Text(text)),
        None => None,
    };

    let mut request = GatewayRequest::new(&event.http_method)
        .with_headers(event.headers.map(Headers::from).unwrap_or_default())
        .with_query_params(event.query_string_parameters)
        .with_path_parameters(event.path_parameters);
    if let Some(path) = event.path {
        request = request.with_path(path);
    }
    if let Some(resource) = event.resource {
        request = request.with_resource(resource);
    }
    if let Some(body) = body {
        request = request.with_body(body);
    }
    Ok(request)
}

/// Renders a canonical response as a proxy event response.
pub fn to_event(response: &GatewayResponse) -> Value {
    let (body, is_base64_encoded) = match response.body() {
        Some(ResponseBody::Text(text)) => (Some(text.clone()), false),
        Some(ResponseBody::Binary(bytes)) => (Some(STANDARD.encode(bytes)), true),
        None => (None, false),
    };

    let proxy = ProxyResponse {
        status_code: response.status_code(),
        headers: response.headers().iter().collect(),
        body,
        is_base64_encoded,
    };

    // A map of string keys and scalar values always serializes.
    serde_json::to_value(proxy).unwrap_or(Value::Null)
}

/// Runs one proxy event through the dispatcher.
///
/// Handler failures are logged and answered with an empty 500, which is this adapter's half
/// of the failure contract: the dispatcher never translates them itself.
///
/// # Errors
///
/// Malformed events and events missing the deployment's routing field are rejected with an
/// [`EventError`] rather than a response, so the host can report them as invocation errors.
pub async fn handle_event(dispatcher: &Dispatcher, event: Value) -> Result<Value, EventError> {
    let request = parse_event(event)?;
    debug!(method = request.method(), path = ?request.path(), "handling proxy event");

    let response = match dispatcher.handle(request).await {
        Ok(response) => response,
        Err(DispatchError::Request(e)) => return Err(e.into()),
        Err(DispatchError::Handler(e)) => {
            error!(error = %e, "handler failed");
            GatewayResponse::empty(500)
        }
    };
    Ok(to_event(&response))
}
