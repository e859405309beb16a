//! Unified error handling for gatebridge
//!
//! Every fallible operation outside of application dispatch returns a
//! [`BridgeError`]. Errors raised while dispatching are carried as
//! [`Failure`](super::response::Failure) values instead and never reach the
//! caller of `handle`.

use std::fmt;

/// Unified error types for the bridge
#[derive(Debug)]
pub enum BridgeError {
    /// The inbound invocation envelope is malformed or misses required fields
    InvalidEnvelope(String),

    /// Configuration-related errors
    Configuration(String),

    /// A binding could not be resolved from the execution context
    Binding(String),

    /// Route table construction failures
    Routing(String),

    /// JSON encoding/decoding errors
    Serialization(serde_json::Error),

    /// File and stream I/O errors
    Io(std::io::Error),

    /// Internal system errors
    Internal(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::InvalidEnvelope(msg) => write!(f, "Invalid envelope: {msg}"),
            BridgeError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            BridgeError::Binding(msg) => write!(f, "Binding resolution failed: {msg}"),
            BridgeError::Routing(msg) => write!(f, "Routing error: {msg}"),
            BridgeError::Serialization(err) => write!(f, "Serialization error: {err}"),
            BridgeError::Io(err) => write!(f, "I/O error: {err}"),
            BridgeError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Serialization(err) => Some(err),
            BridgeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err)
    }
}

impl From<validator::ValidationErrors> for BridgeError {
    fn from(err: validator::ValidationErrors) -> Self {
        BridgeError::Configuration(err.to_string())
    }
}

impl From<matchit::InsertError> for BridgeError {
    fn from(err: matchit::InsertError) -> Self {
        BridgeError::Routing(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> BridgeResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> BridgeResult<T> {
        self.map_err(|e| BridgeError::Internal(format!("{context}: {e}")))
    }
}

#[macro_export]
macro_rules! config_error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::core::error::BridgeError::Configuration(format!($fmt $(, $arg)*))
    };
    ($msg:expr) => {
        $crate::core::error::BridgeError::Configuration($msg.to_string())
    };
}

#[macro_export]
macro_rules! envelope_error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::core::error::BridgeError::InvalidEnvelope(format!($fmt $(, $arg)*))
    };
    ($msg:expr) => {
        $crate::core::error::BridgeError::InvalidEnvelope($msg.to_string())
    };
}

#[macro_export]
macro_rules! internal_error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::core::error::BridgeError::Internal(format!($fmt $(, $arg)*))
    };
    ($msg:expr) => {
        $crate::core::error::BridgeError::Internal($msg.to_string())
    };
}
