//! Response values produced by dispatchers and by the adapter.

use std::{any::Any, fmt};

use bytes::Bytes;
use http::StatusCode;

use super::{error::BridgeError, headers::HeaderBag};

/// Response produced by the application on a successful dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalResponse {
    pub status: StatusCode,
    pub headers: HeaderBag,
    pub body: Bytes,
}

impl InternalResponse {
    /// A `200 OK` response carrying `body`.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderBag::new(),
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set several headers at once, replacing earlier values of the same name.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.insert(k, v);
        }
        self
    }
}

impl From<&'static str> for InternalResponse {
    fn from(body: &'static str) -> Self {
        InternalResponse::new(body)
    }
}

impl From<String> for InternalResponse {
    fn from(body: String) -> Self {
        InternalResponse::new(body)
    }
}

/// Where an unhandled failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOrigin {
    /// The dispatcher returned an error
    Error,
    /// Application code panicked during dispatch
    Panic,
}

/// An unhandled failure raised while dispatching a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    message: String,
    origin: FailureOrigin,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: FailureOrigin::Error,
        }
    }

    /// Build a failure from a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        Self {
            message,
            origin: FailureOrigin::Panic,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> FailureOrigin {
        self.origin
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            FailureOrigin::Error => write!(f, "{}", self.message),
            FailureOrigin::Panic => write!(f, "panic: {}", self.message),
        }
    }
}

impl std::error::Error for Failure {}

impl From<BridgeError> for Failure {
    fn from(err: BridgeError) -> Self {
        Failure::new(err.to_string())
    }
}

/// Outcome of a single dispatch.
pub type DispatchResult = Result<InternalResponse, Failure>;

/// Canonical outbound response. Produced exactly once per handled request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: HeaderBag,
    pub body: Bytes,
}

impl ResponseEnvelope {
    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }
}
