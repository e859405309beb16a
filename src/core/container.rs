//! Application container
//!
//! The Application holds what every request starts from: the prototype
//! bindings registered at boot and the lifecycle listener registry. It never
//! hands out its own binding store; each request gets a fresh
//! [`ExecutionContext`] copied from the prototype.

use std::{
    any::Any,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::debug;

use super::{
    context::{Binding, ContextId, ExecutionContext, Instance, Prototype},
    event::ListenerRegistry,
    scope::{self, ContextHandle},
};

/// Main application container
pub struct Application {
    /// Bindings every context starts from
    prototype: Prototype,

    /// Listeners notified around each dispatch
    listeners: Arc<ListenerRegistry>,

    /// Source of context identifiers
    next_context: AtomicU64,
}

impl Application {
    /// Create an application with no bindings and no listeners
    pub fn new() -> Self {
        Self {
            prototype: Prototype::default(),
            listeners: Arc::new(ListenerRegistry::new()),
            next_context: AtomicU64::new(1),
        }
    }

    /// Register a transient prototype binding
    pub fn bind<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        let key = key.into();
        debug!("Registering prototype binding: {key}");
        self.prototype.instances.remove(&key);
        self.prototype
            .bindings
            .insert(key, Binding::new(factory, false));
    }

    /// Register a prototype singleton. It is resolved at most once per
    /// request, never shared between requests.
    pub fn singleton<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        let key = key.into();
        debug!("Registering prototype singleton: {key}");
        self.prototype.instances.remove(&key);
        self.prototype
            .bindings
            .insert(key, Binding::new(factory, true));
    }

    /// Register an immutable value visible in every context
    pub fn instance<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        debug!("Registering prototype instance: {key}");
        self.prototype.bindings.remove(&key);
        self.prototype
            .instances
            .insert(key, Arc::new(value) as Instance);
    }

    /// Whether the prototype knows `key`
    pub fn bound(&self, key: &str) -> bool {
        self.prototype.bindings.contains_key(key) || self.prototype.instances.contains_key(key)
    }

    /// Get the listener registry
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Build a detached context from the prototype.
    pub fn sandbox(&self) -> ExecutionContext {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        ExecutionContext::from_prototype(id, &self.prototype)
    }

    /// Build a context from the prototype and make it the current scope of
    /// the calling thread until the handle is released.
    pub fn acquire(&self) -> ContextHandle {
        scope::acquire(self)
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}
