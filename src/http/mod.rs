//! HTTP/1.1 wire types used by the local development server.
//!
//! This module provides the primitives the [`server`](crate::server) adapter speaks on the
//! socket: [`StatusCode`], [`Headers`], [`Request`], and [`Response`]. The dispatch core
//! never sees these types; it works on [`GatewayRequest`](crate::gateway::GatewayRequest)
//! and [`GatewayResponse`](crate::gateway::GatewayResponse).

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

macro_rules! status_codes {
    ($($variant:ident = $code:literal => $reason:literal,)+) => {
        /// Well-known HTTP response status codes.
        ///
        /// Handlers may answer with any numeric status, so the wire [`Response`] stores a
        /// plain `u16`; this enum names the common ones and supplies reason phrases.
        ///
        /// # Examples
        ///
        /// ```
        /// use lambda_page::http::StatusCode;
        ///
        /// assert_eq!(StatusCode::Created.as_u16(), 201);
        /// assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
        /// assert_eq!(StatusCode::NotFound.canonical_reason(), "Not Found");
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $($variant = $code,)+
        }

        impl StatusCode {
            /// Returns the numeric status code as a `u16`.
            pub fn as_u16(self) -> u16 {
                self as u16
            }

            /// Looks up a known status code by number.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Returns the canonical reason phrase for this status code.
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }
        }
    };
}

status_codes! {
    Ok = 200 => "OK",
    Created = 201 => "Created",
    Accepted = 202 => "Accepted",
    NoContent = 204 => "No Content",
    MovedPermanently = 301 => "Moved Permanently",
    Found = 302 => "Found",
    SeeOther = 303 => "See Other",
    NotModified = 304 => "Not Modified",
    TemporaryRedirect = 307 => "Temporary Redirect",
    PermanentRedirect = 308 => "Permanent Redirect",
    BadRequest = 400 => "Bad Request",
    Unauthorized = 401 => "Unauthorized",
    Forbidden = 403 => "Forbidden",
    NotFound = 404 => "Not Found",
    MethodNotAllowed = 405 => "Method Not Allowed",
    Conflict = 409 => "Conflict",
    Gone = 410 => "Gone",
    PayloadTooLarge = 413 => "Payload Too Large",
    UnsupportedMediaType = 415 => "Unsupported Media Type",
    UnprocessableEntity = 422 => "Unprocessable Entity",
    TooManyRequests = 429 => "Too Many Requests",
    InternalServerError = 500 => "Internal Server Error",
    NotImplemented = 501 => "Not Implemented",
    BadGateway = 502 => "Bad Gateway",
    ServiceUnavailable = 503 => "Service Unavailable",
    GatewayTimeout = 504 => "Gateway Timeout",
}

/// Reason phrase for an arbitrary numeric status; empty for codes this crate doesn't name.
pub fn reason_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code).map_or("", StatusCode::canonical_reason)
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}
