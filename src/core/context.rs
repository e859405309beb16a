//! Per-request execution context
//!
//! This module provides the ExecutionContext: the binding store, resolved
//! singleton cache and request attributes that application code sees while
//! one request is being dispatched. A context is always built from the
//! application's prototype and is dropped when the request ends, so nothing
//! registered during one request survives into the next.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use log::trace;

use super::error::{BridgeError, BridgeResult};

/// Type-erased, shareable value stored in a context.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Factory used to build a bound value on demand.
pub type Factory = Arc<dyn Fn(&ExecutionContext) -> Instance + Send + Sync>;

/// Identifier of one execution context, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A registered binding: a factory plus whether its first result is cached.
#[derive(Clone)]
pub struct Binding {
    factory: Factory,
    shared: bool,
}

impl Binding {
    pub fn new<T, F>(factory: F, shared: bool) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move |ctx| Arc::new(factory(ctx)) as Instance),
            shared,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// Bindings and instances a context starts from.
#[derive(Clone, Debug, Default)]
pub struct Prototype {
    pub(crate) bindings: HashMap<String, Binding>,
    pub(crate) instances: HashMap<String, Instance>,
}

/// Context that holds the binding store for exactly one request
pub struct ExecutionContext {
    id: ContextId,

    /// Registered factories, keyed by abstract name
    bindings: HashMap<String, Binding>,

    /// Resolved shared bindings and registered instances
    instances: HashMap<String, Instance>,

    /// Request attributes available to handlers (type-erased, thread-safe)
    vars: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// Create a context seeded from `prototype`. The resolution cache only
    /// holds the prototype's own instances.
    pub fn from_prototype(id: ContextId, prototype: &Prototype) -> Self {
        Self {
            id,
            bindings: prototype.bindings.clone(),
            instances: prototype.instances.clone(),
            vars: HashMap::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Register a transient binding; every `make` calls the factory again.
    pub fn bind<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        self.register(key.into(), Binding::new(factory, false));
    }

    /// Register a shared binding; the first `make` result is cached for the
    /// rest of this context's life.
    pub fn singleton<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        self.register(key.into(), Binding::new(factory, true));
    }

    fn register(&mut self, key: String, binding: Binding) {
        trace!("{}: binding {key} (shared: {})", self.id, binding.shared);
        self.instances.remove(&key);
        self.bindings.insert(key, binding);
    }

    /// Register an already built value.
    pub fn instance<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        trace!("{}: instance {key}", self.id);
        self.bindings.remove(&key);
        self.instances.insert(key, Arc::new(value));
    }

    /// Whether `key` has a binding or an instance in this context.
    pub fn bound(&self, key: &str) -> bool {
        self.bindings.contains_key(key) || self.instances.contains_key(key)
    }

    /// Whether a shared binding or instance has already been resolved.
    pub fn resolved(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    /// Resolve `key` and downcast it to `T`.
    pub fn make<T: Any + Send + Sync>(&mut self, key: &str) -> BridgeResult<Arc<T>> {
        let instance = self.make_any(key)?;
        instance.downcast::<T>().map_err(|_| {
            BridgeError::Binding(format!(
                "{key} does not resolve to {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Resolve `key` without a type check.
    pub fn make_any(&mut self, key: &str) -> BridgeResult<Instance> {
        if let Some(instance) = self.instances.get(key) {
            return Ok(instance.clone());
        }

        let binding = self
            .bindings
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::Binding(format!("{key} is not bound")))?;

        let instance = (binding.factory)(&*self);
        if binding.shared {
            self.instances.insert(key.to_string(), instance.clone());
        }
        Ok(instance)
    }

    /// Already resolved value of `key`, without running any factory.
    pub fn peek<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.instances
            .get(key)
            .and_then(|instance| instance.clone().downcast::<T>().ok())
    }

    /// Drop the binding and any resolved value for `key`.
    pub fn forget(&mut self, key: &str) -> bool {
        let had_binding = self.bindings.remove(key).is_some();
        let had_instance = self.instances.remove(key).is_some();
        had_binding || had_instance
    }

    /// Clear every binding, instance and attribute.
    pub fn flush(&mut self) {
        trace!(
            "{}: flushing {} bindings, {} instances, {} vars",
            self.id,
            self.bindings.len(),
            self.instances.len(),
            self.vars.len()
        );
        self.bindings.clear();
        self.instances.clear();
        self.vars.clear();
    }

    /// Number of registered bindings and instances.
    pub fn binding_count(&self) -> usize {
        self.bindings.len() + self.instances.len()
    }

    /// Store a typed request attribute
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.vars.insert(key.into(), Box::new(value));
    }

    /// Get a typed reference to a request attribute
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.vars.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a string slice if the stored attribute is a `String`
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get::<String>(key).map(|s| s.as_str())
    }

    /// Check if an attribute exists
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Remove an attribute
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.vars.remove(key)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}
