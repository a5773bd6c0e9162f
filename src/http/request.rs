use std::collections::HashMap;

/// HTTP request methods.
///
/// The dispatch core never branches on the method itself; it is exposed so
/// filter predicates and router functions can consult it.
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

/// Request descriptor handed in by the transport.
///
/// `path` is the request target exactly as it appeared on the request
/// line: not decoded, possibly carrying a query string and fragment, and
/// possibly an absolute URI.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target (e.g., "/api/users?page=2")
    pub path: String,
    /// Request headers as key-value pairs
    pub headers: HashMap<String, String>,
}

/// Builder for constructing Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    headers: HashMap<String, String>,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Matching is case-sensitive, as on the wire.
    ///
    /// ```
    /// # use dispatch_engine::http::request::Method;
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

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Shorthand for setting the `Host` header.
    pub fn host(self, host: impl Into<String>) -> Self {
        self.header("Host", host)
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.unwrap_or(Method::GET),
            path: self.path.ok_or("path missing")?,
            headers: self.headers,
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
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(|v| v.as_str())
    }

    /// The `Host` header, or an empty string when absent.
    pub fn host(&self) -> &str {
        self.header("Host").unwrap_or("")
    }
}
