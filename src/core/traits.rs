//! Core traits for gatebridge components
//!
//! These are the seams between the adapter and the code it drives: the
//! dispatch engine, the individual route handlers and the lifecycle
//! listeners.

use std::collections::BTreeMap;

use super::{
    context::ExecutionContext,
    event::LifecycleEvent,
    request::RequestDescriptor,
    response::DispatchResult,
};

/// Parameters captured from the matched route pattern.
pub type RouteParams = BTreeMap<String, String>;

/// Routes a request through application logic.
///
/// Implementations may return a [`Failure`](super::response::Failure) or
/// panic; the adapter turns both into a 500 response.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: &RequestDescriptor, ctx: &mut ExecutionContext) -> DispatchResult;
}

/// Handles requests for one matched route.
pub trait RouteHandler: Send + Sync {
    fn handle(
        &self,
        request: &RequestDescriptor,
        params: &RouteParams,
        ctx: &mut ExecutionContext,
    ) -> DispatchResult;
}

impl<F> RouteHandler for F
where
    F: Fn(&RequestDescriptor, &RouteParams, &mut ExecutionContext) -> DispatchResult
        + Send
        + Sync,
{
    fn handle(
        &self,
        request: &RequestDescriptor,
        params: &RouteParams,
        ctx: &mut ExecutionContext,
    ) -> DispatchResult {
        self(request, params, ctx)
    }
}

/// Observer of request lifecycle events.
pub trait LifecycleListener: Send + Sync {
    /// Listener name used in logs
    fn name(&self) -> &str {
        "anonymous"
    }

    fn handle(&self, event: &LifecycleEvent<'_>);
}
