//! Core abstractions and interfaces for gatebridge
//!
//! This module provides the request and response values, the isolated
//! execution context, the lifecycle event registry and the traits that
//! connect the adapter to application code.

pub mod container;
pub mod context;
pub mod error;
pub mod event;
pub mod headers;
pub mod request;
pub mod response;
pub mod scope;
pub mod traits;


// Re-export commonly used types
pub use container::Application;
pub use context::{ContextId, ExecutionContext};
pub use error::{BridgeError, BridgeResult};
pub use event::{EventKind, LifecycleEvent, ListenerRegistry};
pub use headers::HeaderBag;
pub use request::RequestDescriptor;
pub use response::{DispatchResult, Failure, FailureOrigin, InternalResponse, ResponseEnvelope};
pub use scope::ContextHandle;
pub use traits::*;
