//! Per-thread "current context" tracking.
//!
//! Each thread keeps a stack of the contexts it has acquired. Acquiring
//! pushes, releasing pops and so restores whatever scope was current
//! before. Workers serving requests on different threads each see only
//! their own stack.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    thread::{self, ThreadId},
};

use dashmap::DashMap;
use log::{debug, warn};
use once_cell::sync::Lazy;

use super::{
    container::Application,
    context::{ContextId, ExecutionContext},
};

static SCOPES: Lazy<DashMap<ThreadId, Vec<ContextId>>> = Lazy::new(DashMap::new);

/// Exclusive access to an acquired context. Releasing the handle (or
/// dropping it) flushes the context and restores the previous scope.
pub struct ContextHandle {
    context: ExecutionContext,
    thread: ThreadId,
}

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.context.id()
    }
}

impl Deref for ContextHandle {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl DerefMut for ContextHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.context
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("context", &self.context)
            .field("thread", &self.thread)
            .finish()
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        let id = self.context.id();
        self.context.flush();
        pop_scope(self.thread, id);
        debug!("Released context {id}");
    }
}

/// Build a fresh context from `app` and make it current for this thread.
pub fn acquire(app: &Application) -> ContextHandle {
    let context = app.sandbox();
    let thread = thread::current().id();
    SCOPES.entry(thread).or_default().push(context.id());
    debug!("Acquired context {}", context.id());
    ContextHandle { context, thread }
}

/// Release a context. Equivalent to dropping the handle.
pub fn release(handle: ContextHandle) {
    drop(handle);
}

/// Context currently in scope on the calling thread.
pub fn current() -> Option<ContextId> {
    SCOPES
        .get(&thread::current().id())
        .and_then(|stack| stack.last().copied())
}

/// Number of contexts acquired and not yet released on the calling thread.
pub fn depth() -> usize {
    SCOPES
        .get(&thread::current().id())
        .map_or(0, |stack| stack.len())
}

fn pop_scope(thread: ThreadId, id: ContextId) {
    let emptied = match SCOPES.get_mut(&thread) {
        Some(mut stack) => {
            if stack.last() == Some(&id) {
                stack.pop();
            } else {
                warn!("Context {id} released out of order");
                stack.retain(|entry| *entry != id);
            }
            stack.is_empty()
        }
        None => {
            warn!("Context {id} released without a scope");
            false
        }
    };

    if emptied {
        SCOPES.remove_if(&thread, |_, stack| stack.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_sets_and_release_restores_scope() {
        let app = Application::new();
        assert_eq!(current(), None);

        let outer = acquire(&app);
        assert_eq!(current(), Some(outer.id()));

        let inner = acquire(&app);
        assert_eq!(current(), Some(inner.id()));
        assert_eq!(depth(), 2);

        release(inner);
        assert_eq!(current(), Some(outer.id()));

        release(outer);
        assert_eq!(current(), None);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_out_of_order_release_keeps_remaining_scope() {
        let app = Application::new();
        let outer = acquire(&app);
        let inner = acquire(&app);
        let inner_id = inner.id();

        release(outer);
        assert_eq!(current(), Some(inner_id));

        release(inner);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_scope_is_released_on_unwind() {
        let app = Application::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _handle = acquire(&app);
            panic!("dispatch blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(current(), None);
    }

    #[test]
    fn test_threads_have_independent_scopes() {
        let app = Application::new();
        let handle = acquire(&app);
        let main_id = handle.id();

        std::thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(current(), None);
                let worker = acquire(&app);
                assert_eq!(current(), Some(worker.id()));
            });
        });

        assert_eq!(current(), Some(main_id));
        drop(handle);
    }

    #[test]
    fn test_handle_derefs_to_context() {
        let app = Application::new();
        let mut handle = acquire(&app);
        handle.instance("counter", 1_u32);
        assert!(handle.bound("counter"));
    }
}
