use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use url::Url;

/// HTTP request methods.
///
/// Anything outside this set is rejected by the parser as a malformed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use mhttp::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
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

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive header map. A repeated name overwrites the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.entries
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
        } else {
            self.entries.get(name).map(String::as_str)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over `(lowercased name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A parsed HTTP request.
///
/// Filled in field by field while the parser walks the byte stream, then
/// handed to the handler as a finished value.
#[derive(Debug, Clone)]
pub struct Request {
    /// Peer address of the connection this request arrived on
    pub remote_addr: SocketAddr,
    /// Whether the transport below this layer is encrypted
    pub is_secure: bool,
    /// Value of the `Host` header, if any
    pub host: Option<String>,
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Absolute URL rebuilt from scheme, host, path and query
    pub url: Option<Url>,
    /// Request path without the query (e.g. "/index.html")
    pub path: String,
    /// Query string including the leading `?`, or empty
    pub query: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers
    pub headers: Headers,
    pub content_type: Option<String>,
    pub content_length: usize,
    /// Whether the client wants the connection reused after the response
    pub keep_alive: bool,
    /// Exactly `content_length` bytes
    pub body: Bytes,
    /// Captures from `{name}` segments of the matched route
    pub path_variables: HashMap<String, String>,
    /// Path remainder captured by a trailing `*` in the matched route
    pub wildcard: Option<String>,
}

impl Request {
    /// An empty request waiting to be filled in by the parser.
    pub fn new(remote_addr: SocketAddr, is_secure: bool) -> Self {
        Self {
            remote_addr,
            is_secure,
            host: None,
            method: Method::GET,
            url: None,
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: Headers::new(),
            content_type: None,
            content_length: 0,
            keep_alive: false,
            body: Bytes::new(),
            path_variables: HashMap::new(),
            wildcard: None,
        }
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.headers.get(name).unwrap_or(default)
    }

    /// Like [`Request::header`], but a missing or empty value is an error
    /// that surfaces to the client as 400.
    pub fn require_header(&self, name: &str) -> Result<&str, RequestError> {
        match self.headers.get(name) {
            Some("") => Err(RequestError::EmptyHeader(name.to_string())),
            Some(value) => Ok(value),
            None => Err(RequestError::MissingHeader(name.to_string())),
        }
    }

    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }

    pub fn accepts_gzip(&self) -> bool {
        self.header("Accept-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("gzip"))
            .unwrap_or(false)
    }

    /// Keep-alive resolution for a version and its `Connection` header.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`; HTTP/1.0
    /// defaults to close unless `Connection: keep-alive`.
    pub fn resolve_keep_alive(version: &str, connection: Option<&str>) -> bool {
        let has_token = |token: &str| {
            connection
                .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
                .unwrap_or(false)
        };

        if version.eq_ignore_ascii_case("HTTP/1.0") {
            has_token("keep-alive")
        } else {
            !has_token("close")
        }
    }
}

/// Failures raised by request accessors, reported to the client as 400.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("'{0}' header not found")]
    MissingHeader(String),
    #[error("'{0}' header cannot be empty")]
    EmptyHeader(String),
}

/// Builder for constructing Request objects outside the parser.
pub struct RequestBuilder {
    remote_addr: SocketAddr,
    method: Option<Method>,
    path: Option<String>,
    version: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            remote_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            method: None,
            path: None,
            version: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the request target; anything after `?` becomes the query.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let target = self.path.ok_or("path missing")?;
        let (path, query) = match target.find('?') {
            Some(i) => (target[..i].to_string(), target[i..].to_string()),
            None => (target, String::new()),
        };
        let version = self.version.unwrap_or_else(|| "HTTP/1.1".to_string());
        let keep_alive = Request::resolve_keep_alive(&version, self.headers.get("connection"));
        let host = self.headers.get("host").map(str::to_string);
        let url = host
            .as_deref()
            .and_then(|h| Url::parse(&format!("http://{h}{path}{query}")).ok());

        Ok(Request {
            remote_addr: self.remote_addr,
            is_secure: false,
            host,
            method: self.method.ok_or("method missing")?,
            url,
            path,
            query,
            version,
            content_type: self.headers.get("content-type").map(str::to_string),
            content_length: self.body.len(),
            keep_alive,
            headers: self.headers,
            body: Bytes::from(self.body),
            path_variables: HashMap::new(),
            wildcard: None,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
