//! Handler replies and the normalized response adapters send back.

use std::io;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::{Formatter, Serializer};

use super::DEFAULT_CONTENT_TYPE;
use crate::http::Headers;

/// What a handler returns: a body, optionally with an explicit status code.
///
/// This is also the shape the cache persists, before normalization, so that a cached reply
/// normalizes exactly like a fresh one. A string body is sent verbatim; any other JSON value
/// is serialized.
///
/// # Examples
///
/// ```
/// use lambda_page::gateway::Reply;
/// use serde_json::json;
///
/// let bare = Reply::body(json!({"message": "hello"}));
/// assert_eq!(bare.status(), None);
///
/// let created = Reply::with_status(201, "created");
/// assert_eq!(created.status(), Some(201));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    body: Value,
}

impl Reply {
    /// A bare body; the response status defaults to 200.
    pub fn body(body: impl Into<Value>) -> Self {
        Self {
            status: None,
            body: body.into(),
        }
    }

    /// A `(status, body)` pair.
    pub fn with_status(status: u16, body: impl Into<Value>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
        }
    }

    /// Serializes any value into a bare-body reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::body)
    }

    /// The explicit status, if the handler gave one.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The body exactly as the handler returned it, before normalization.
    pub fn body_value(&self) -> &Value {
        &self.body
    }

    /// Normalizes the reply for an endpoint declaring `content_type`.
    ///
    /// - the status defaults to 200,
    /// - a string body is used as-is, anything else becomes its JSON text with a space
    ///   after every `,` and `:` and members in the order the handler built them,
    /// - for any content type other than [`DEFAULT_CONTENT_TYPE`] the body is binary.
    ///
    /// # Examples
    ///
    /// ```
    /// use lambda_page::gateway::{Reply, ResponseBody};
    /// use serde_json::json;
    ///
    /// let response = Reply::body(json!({"message": "hello", "count": 2}))
    ///     .into_response("application/json");
    /// assert_eq!(
    ///     response.body(),
    ///     Some(&ResponseBody::Text(r#"{"message": "hello", "count": 2}"#.to_owned()))
    /// );
    /// ```
    pub fn into_response(self, content_type: &str) -> GatewayResponse {
        let text = match self.body {
            Value::String(text) => text,
            other => to_json_text(&other),
        };
        let body = if content_type == DEFAULT_CONTENT_TYPE {
            ResponseBody::Text(text)
        } else {
            ResponseBody::Binary(Bytes::from(text))
        };

        let mut headers = Headers::with_capacity(1);
        headers.set("content-type", content_type);

        GatewayResponse {
            status_code: self.status.unwrap_or(200),
            headers,
            body: Some(body),
        }
    }
}

impl From<Value> for Reply {
    fn from(body: Value) -> Self {
        Reply::body(body)
    }
}

impl From<(u16, Value)> for Reply {
    fn from((status, body): (u16, Value)) -> Self {
        Reply::with_status(status, body)
    }
}

/// JSON text with `", "` and `": "` separators, the layout page clients already parse.
fn to_json_text(value: &Value) -> String {
    let mut out = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut out, SpacedFormatter);
    // Writing a `Value` into a `Vec` neither fails nor produces invalid UTF-8.
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Normalized response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    /// The body's bytes; text bodies are their UTF-8 encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ResponseBody::Text(text) => text.as_bytes(),
            ResponseBody::Binary(bytes) => bytes,
        }
    }

    /// Returns `true` for bodies normalized for a non-JSON content type.
    pub fn is_binary(&self) -> bool {
        matches!(self, ResponseBody::Binary(_))
    }

    /// Converts into bytes without copying.
    pub fn into_bytes(self) -> Bytes {
        match self {
            ResponseBody::Text(text) => Bytes::from(text),
            ResponseBody::Binary(bytes) => bytes,
        }
    }
}

/// The adapter-agnostic response the dispatcher produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    status_code: u16,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl GatewayResponse {
    /// A response with no headers and no body.
    pub fn empty(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            body: None,
        }
    }

    /// The routing-miss response: 404, no content type, no body.
    pub fn not_found() -> Self {
        Self::empty(404)
    }

    /// Returns the HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns the response headers; empty for routing misses.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the `content-type` header, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Returns the body, or `None` for bodiless responses such as a routing miss.
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// Splits the response into its parts.
    pub fn into_parts(self) -> (u16, Headers, Option<ResponseBody>) {
        (self.status_code, self.headers, self.body)
    }
}
