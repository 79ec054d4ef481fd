//! Content-addressed cache keys.
//!
//! A key fingerprints exactly four request fields: the routing key, the method, the query
//! parameters and the body. They are laid out as a JSON object with lexicographically
//! sorted member names, serialized compactly, and hashed with SHA-256 truncated to 128
//! bits. Headers never take part, so two requests that differ only in headers share a
//! cache entry.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::gateway::{GatewayRequest, QueryParams, QueryValue, RequestError, RoutingMode};

/// Digest width in bytes; rendered as twice as many hex characters.
const FINGERPRINT_BYTES: usize = 16;

/// A fixed-width hexadecimal request fingerprint.
///
/// # Examples
///
/// ```
/// use lambda_page::cache::CacheKey;
/// use lambda_page::gateway::GatewayRequest;
///
/// let a = GatewayRequest::new("GET").with_path("/").with_header("x-trace", "1");
/// let b = GatewayRequest::new("get").with_path("/").with_header("x-trace", "2");
///
/// let key = CacheKey::derive("/", &a);
/// assert_eq!(key, CacheKey::derive("/", &b));
/// assert_eq!(key.as_str().len(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprints `request` using `routing_key` as its route.
    ///
    /// The routing key is passed in rather than read from the request so the caller decides
    /// once, per deployment, whether the literal path or the resource template is used.
    pub fn derive(routing_key: &str, request: &GatewayRequest) -> Self {
        let digest = Sha256::digest(canonical_fields(routing_key, request).as_bytes());
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Resolves the routing key for `mode` and fingerprints the request.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingField`] when the request lacks the field `mode` routes on.
    pub fn for_request(request: &GatewayRequest, mode: RoutingMode) -> Result<Self, RequestError> {
        Ok(Self::derive(request.routing_key(mode)?, request))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// serde_json keeps insertion order (`preserve_order`), so members go in sorted by name.
// The query map is a `BTreeMap` and iterates sorted as well.
fn canonical_fields(routing_key: &str, request: &GatewayRequest) -> String {
    let mut fields = Map::new();
    fields.insert(
        "body".to_owned(),
        request
            .body_text()
            .map_or(Value::Null, |text| Value::String(text.into_owned())),
    );
    fields.insert(
        "httpMethod".to_owned(),
        Value::String(request.method().to_owned()),
    );
    fields.insert("path".to_owned(), Value::String(routing_key.to_owned()));
    fields.insert(
        "queryStringParameters".to_owned(),
        request.query().map_or(Value::Null, query_value),
    );
    Value::Object(fields).to_string()
}

fn query_value(query: &QueryParams) -> Value {
    let members = query.iter().map(|(name, value)| {
        let value = match value {
            QueryValue::One(one) => Value::String(one.clone()),
            QueryValue::Many(many) => many.iter().cloned().map(Value::String).collect(),
        };
        (name.clone(), value)
    });
    Value::Object(members.collect())
}
