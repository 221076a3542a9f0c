use std::collections::HashMap;

/// A parsed HTTP request.
///
/// Filled in incrementally by the parser; every field is a plain owned
/// value, so the request stays valid across inbound-buffer compaction and
/// growth. Method, path and version come from the request line; the path
/// may have been rewritten (default-route suffixing, login/register
/// redirects) by the time the response builder sees it.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// The HTTP method token, verbatim (e.g. "GET", "POST")
    pub method: String,
    /// The request path, after rewriting
    pub path: String,
    /// HTTP version without the "HTTP/" prefix (e.g. "1.1")
    pub version: String,
    /// Header key-value pairs; a repeated key keeps the last value
    pub headers: HashMap<String, String>,
    /// The single-line request body, if any
    pub body: String,
    /// Decoded urlencoded form fields from a POST body
    pub form: HashMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a header value by its exact (case-sensitive) key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    /// Retrieves a decoded form field from a POST body.
    pub fn post(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(|v| v.as_str())
    }

    /// Whether the client asked to keep the connection open: the
    /// `Connection` header must be exactly `keep-alive` and the version
    /// must be 1.1.
    pub fn is_keep_alive(&self) -> bool {
        self.header("Connection") == Some("keep-alive") && self.version == "1.1"
    }
}
