use std::collections::HashMap;

use thiserror::Error;
use url::Url;

use crate::http::body::Body;

/// Scheme used to address drives when a request does not carry one.
pub const DRIVE_SCHEME: &str = "hyper";

/// Why a request does not address a drive.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("request has no Host header")]
    MissingHost,

    #[error(transparent)]
    Parse(#[from] url::ParseError),
}

/// HTTP request methods.
///
/// `GET`, `HEAD`, `PUT`, `POST` and `DELETE` are routed to drive operations.
/// The rest are parsed so they can be answered with 405 Method Not Allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Read a file, a directory listing or extension state
    GET,
    /// POST - Create a drive or send an extension message
    POST,
    /// PUT - Write one or more files
    PUT,
    /// DELETE - Remove a file or a directory's contents
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

/// Represents a parsed HTTP request from a client.
///
/// The body is a [`Body`] so that uploads can be streamed into a drive as
/// they arrive instead of being buffered first.
#[derive(Debug)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target, either origin-form (`/a/b.txt?x`) or absolute
    /// (`hyper://origin/a/b.txt`)
    pub path: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Request body for POST/PUT requests
    pub body: Body,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Option<String>,
    headers: HashMap<String, String>,
    body: Body,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use drivefetch::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(key)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, value)| value)
            })
            .map(|v| v.as_str())
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Whether the body is framed with chunked transfer encoding.
    ///
    /// Takes precedence over `Content-Length`.
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .and_then(|codings| codings.rsplit(',').next())
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
    }

    /// The `Accept` header, empty when absent.
    pub fn accept(&self) -> &str {
        self.header("Accept").unwrap_or("")
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// Checks the Connection header. For HTTP/1.1, the default is `true` (keep-alive).
    pub fn keep_alive(&self) -> bool {
        self.header("Connection")
            .map(|v| !v.eq_ignore_ascii_case("close"))
            .unwrap_or(self.version != "HTTP/1.0")
    }

    /// Resolves the full drive URL this request addresses.
    ///
    /// Absolute targets are used as-is. Origin-form targets take their host
    /// from the `Host` header, dropping any port.
    pub fn url(&self) -> Result<Url, UrlError> {
        if let Ok(url) = Url::parse(&self.path) {
            if url.has_host() {
                return Ok(url);
            }
        }

        let host = self
            .header("Host")
            .map(strip_port)
            .filter(|host| !host.is_empty())
            .ok_or(UrlError::MissingHost)?;
        let path = if self.path.starts_with('/') {
            self.path.as_str()
        } else {
            "/"
        };
        Ok(Url::parse(&format!("{DRIVE_SCHEME}://{host}{path}"))?)
    }
}

fn strip_port(host: &str) -> &str {
    // bracketed IPv6 literals keep their colons
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}
