//! HTTP/1.1 request head parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;
use url::form_urlencoded;

use super::Headers;

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request as read off the socket.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is not part of the head;
/// the server attaches it with [`Request::with_body`] once `Content-Length` bytes arrived.
///
/// # Examples
///
/// ```
/// use lambda_page::http::request::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_pairs(), vec![("name".to_owned(), "world".to_owned())]);
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request head from a byte slice.
    ///
    /// Returns the parsed `Request` (with an empty body) and the byte offset at which the
    /// body begins in `buf`.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`ParseError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`ParseError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ParseError::Incomplete),
        };

        let method = raw_req
            .method
            .ok_or(ParseError::MissingField { field: "method" })?
            .to_owned();

        let raw_path = raw_req
            .path
            .ok_or(ParseError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(ParseError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Returns the HTTP method exactly as sent.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the query string split into `(key, value)` pairs in order of appearance.
    ///
    /// Decoded as `application/x-www-form-urlencoded`: `+` becomes a space and
    /// percent-escapes are resolved (invalid UTF-8 is replaced lossily). Repeated keys yield
    /// repeated pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the request and returns its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

fn parse_query_string(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}
