//! Canonical request value handed to dispatchers and listeners.

use bytes::Bytes;
use http::Method;
use uuid::Uuid;

use super::headers::HeaderBag;

/// A normalized inbound request. Built once per envelope and never mutated
/// afterwards; the builder methods consume `self`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    id: String,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderBag,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Create a request for `method` and `path` with a generated id.
    ///
    /// An empty path becomes `/` and a relative one gains a leading slash.
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            path: canonical_path(path.as_ref()),
            query: Vec::new(),
            headers: HeaderBag::new(),
            body: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderBag) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of the query parameter `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query string rebuilt from the parameters, without the leading `?`.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
