//! Dispatcher adapter
//!
//! Drives one request through the full lifecycle: acquire an isolated
//! context, announce the request, dispatch it, normalize the outcome,
//! announce the response and release the context. Whatever the dispatcher
//! does, exactly one response comes out and both events are emitted once.

use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use log::{error, trace};
use serde_json::Value as JsonValue;

use crate::{
    config::FailureBody,
    core::{
        scope, Application, BridgeResult, Dispatcher, Failure, FailureOrigin, RequestDescriptor,
        ResponseEnvelope,
    },
    utils::{
        envelope::normalize_request,
        response::{normalize_failure, normalize_response},
    },
};

/// Stages a single `handle` call moves through, strictly in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    ContextAcquired,
    Dispatching,
    ResponseReady,
    ContextReleased,
}

impl HandleState {
    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            HandleState::Idle => Some(HandleState::ContextAcquired),
            HandleState::ContextAcquired => Some(HandleState::Dispatching),
            HandleState::Dispatching => Some(HandleState::ResponseReady),
            HandleState::ResponseReady => Some(HandleState::ContextReleased),
            HandleState::ContextReleased => None,
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleState::Idle => "idle",
            HandleState::ContextAcquired => "context-acquired",
            HandleState::Dispatching => "dispatching",
            HandleState::ResponseReady => "response-ready",
            HandleState::ContextReleased => "context-released",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of one request for tracing.
struct Progress<'a> {
    request_id: &'a str,
    state: HandleState,
}

impl<'a> Progress<'a> {
    fn start(request_id: &'a str) -> Self {
        Self {
            request_id,
            state: HandleState::Idle,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            trace!("Request {}: {} -> {}", self.request_id, self.state, next);
            self.state = next;
        }
    }
}

/// Bridges invocation envelopes to a [`Dispatcher`].
pub struct DispatcherAdapter {
    app: Application,
    dispatcher: Arc<dyn Dispatcher>,
    failure_body: FailureBody,
}

impl DispatcherAdapter {
    pub fn new(app: Application, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            app,
            dispatcher,
            failure_body: FailureBody::default(),
        }
    }

    /// Choose what the body of a converted 500 response contains.
    pub fn with_failure_body(mut self, failure_body: FailureBody) -> Self {
        self.failure_body = failure_body;
        self
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn failure_body(&self) -> FailureBody {
        self.failure_body
    }

    /// Handle one raw invocation envelope.
    ///
    /// # Errors
    /// Returns `InvalidEnvelope` when the envelope cannot be normalized. No
    /// context is acquired and no event is emitted in that case.
    pub fn handle(&self, envelope: &JsonValue) -> BridgeResult<ResponseEnvelope> {
        let request = normalize_request(envelope)?;
        Ok(self.handle_request(request))
    }

    /// Handle an already normalized request. Dispatch errors and panics are
    /// converted to a 500 response; this never fails.
    pub fn handle_request(&self, request: RequestDescriptor) -> ResponseEnvelope {
        let mut progress = Progress::start(request.id());

        let mut ctx = self.app.acquire();
        progress.advance();

        self.app.listeners().emit_received(&request);

        progress.advance();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.dispatch(&request, &mut ctx)
        }));

        let response = match outcome {
            Ok(Ok(response)) => normalize_response(response),
            Ok(Err(failure)) => self.fail(&request, failure),
            Err(payload) => self.fail(&request, Failure::from_panic(payload)),
        };
        progress.advance();

        self.app.listeners().emit_terminated(&request, &response);

        scope::release(ctx);
        progress.advance();

        response
    }

    fn fail(&self, request: &RequestDescriptor, failure: Failure) -> ResponseEnvelope {
        match failure.origin() {
            FailureOrigin::Error => error!(
                "Request {} {} {} failed: {}",
                request.id(),
                request.method(),
                request.path(),
                failure
            ),
            FailureOrigin::Panic => error!(
                "Request {} {} {} panicked: {}",
                request.id(),
                request.method(),
                request.path(),
                failure.message()
            ),
        }
        normalize_failure(&failure, self.failure_body)
    }
}
