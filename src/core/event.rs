//! Lifecycle events and the listener registry.
//!
//! Events borrow the request and response they describe, so a listener can
//! observe them but never change what the adapter returns. The registry is
//! append-only and read on every request; registration swaps in a new
//! snapshot of the listener list.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use arc_swap::ArcSwap;
use log::{debug, error};

use super::{
    request::RequestDescriptor,
    response::{Failure, ResponseEnvelope},
    traits::LifecycleListener,
};

/// Notification marking the start or the end of request processing.
#[derive(Clone, Copy, Debug)]
pub enum LifecycleEvent<'a> {
    /// Emitted after the context is acquired, before dispatch
    Received { request: &'a RequestDescriptor },

    /// Emitted once the response (or converted failure) is final
    Terminated {
        request: &'a RequestDescriptor,
        response: &'a ResponseEnvelope,
    },
}

impl<'a> LifecycleEvent<'a> {
    pub fn request(&self) -> &'a RequestDescriptor {
        match *self {
            LifecycleEvent::Received { request } => request,
            LifecycleEvent::Terminated { request, .. } => request,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Received { .. } => EventKind::Received,
            LifecycleEvent::Terminated { .. } => EventKind::Terminated,
        }
    }
}

/// Discriminant of [`LifecycleEvent`], handy for filtering and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Received,
    Terminated,
}

/// Adapts a closure into a listener for a single event kind.
struct CallbackListener<F> {
    kind: EventKind,
    callback: F,
}

impl<F> LifecycleListener for CallbackListener<F>
where
    F: Fn(&LifecycleEvent<'_>) + Send + Sync,
{
    fn name(&self) -> &str {
        match self.kind {
            EventKind::Received => "on-received",
            EventKind::Terminated => "on-terminated",
        }
    }

    fn handle(&self, event: &LifecycleEvent<'_>) {
        if event.kind() == self.kind {
            (self.callback)(event);
        }
    }
}

/// Registry of lifecycle listeners shared by every request of an application
pub struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn LifecycleListener>>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a listener
    pub fn register(&self, listener: Arc<dyn LifecycleListener>) {
        debug!("Registering lifecycle listener: {}", listener.name());
        self.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(listener.clone());
            next
        });
    }

    /// Call `callback` for every `Received` event
    pub fn on_received<F>(&self, callback: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.register(Arc::new(CallbackListener {
            kind: EventKind::Received,
            callback,
        }));
    }

    /// Call `callback` for every `Terminated` event
    pub fn on_terminated<F>(&self, callback: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.register(Arc::new(CallbackListener {
            kind: EventKind::Terminated,
            callback,
        }));
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit_received(&self, request: &RequestDescriptor) {
        self.emit(&LifecycleEvent::Received { request });
    }

    pub fn emit_terminated(&self, request: &RequestDescriptor, response: &ResponseEnvelope) {
        self.emit(&LifecycleEvent::Terminated { request, response });
    }

    /// Deliver `event` to every listener in registration order.
    ///
    /// A panicking listener is logged and skipped.
    pub fn emit(&self, event: &LifecycleEvent<'_>) {
        let listeners = self.listeners.load();
        for listener in listeners.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.handle(event)));
            if let Err(payload) = outcome {
                error!(
                    "Listener {} panicked on {:?} for request {}: {}",
                    listener.name(),
                    event.kind(),
                    event.request().id(),
                    Failure::from_panic(payload).message()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::core::headers::HeaderBag;

    fn response() -> ResponseEnvelope {
        ResponseEnvelope {
            status_code: 200,
            headers: HeaderBag::new(),
            body: Bytes::from_static(b"ok"),
        }
    }

    #[test]
    fn test_callbacks_only_see_their_kind() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let received = seen.clone();
        registry.on_received(move |event| received.lock().unwrap().push(event.kind()));
        let terminated = seen.clone();
        registry.on_terminated(move |event| terminated.lock().unwrap().push(event.kind()));
        assert_eq!(registry.len(), 2);

        let request = RequestDescriptor::new(Method::GET, "/");
        registry.emit_received(&request);
        registry.emit_terminated(&request, &response());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Received, EventKind::Terminated]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let delivered = Arc::new(Mutex::new(0));

        registry.on_received(|_| panic!("listener failure"));
        let counter = delivered.clone();
        registry.on_received(move |_| *counter.lock().unwrap() += 1);

        let request = RequestDescriptor::new(Method::GET, "/");
        registry.emit_received(&request);

        assert_eq!(*delivered.lock().unwrap(), 1);
    }

    #[test]
    fn test_terminated_event_exposes_response() {
        let registry = ListenerRegistry::new();
        let status = Arc::new(Mutex::new(None));

        let captured = status.clone();
        registry.on_terminated(move |event| {
            if let LifecycleEvent::Terminated { response, .. } = event {
                *captured.lock().unwrap() = Some(response.status_code);
            }
        });

        let request = RequestDescriptor::new(Method::GET, "/");
        registry.emit_terminated(&request, &response());
        assert_eq!(*status.lock().unwrap(), Some(200));
    }
}
