use crate::error::HostError;
use crate::event_loop::EventLoop;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct ContextInner {
    name: String,
    host: EventLoop,
    closed: Cell<bool>,
    // One slot per type, the way libraries hang state off a global object.
    extensions: RefCell<FxHashMap<TypeId, Rc<dyn Any>>>,
}

/// An isolated global scope (a "page") living on a host event loop.
///
/// The host owns the context. Libraries attach per-context state through the
/// extension slots; closing the context drops all of it.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Rc<ContextInner>,
}

impl ExecutionContext {
    pub fn new(host: &EventLoop, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                name: name.into(),
                host: host.clone(),
                closed: Cell::new(false),
                extensions: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.host
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    pub fn ptr_eq(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Tears the context down and drops every attached extension.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        let extensions = std::mem::take(&mut *self.inner.extensions.borrow_mut());
        tracing::debug!(
            context = %self.inner.name,
            extensions = extensions.len(),
            "closing execution context"
        );
        // Dropped outside the borrow: extension destructors may look at us.
        drop(extensions);
    }

    pub fn extension<T: Any>(&self) -> Option<Rc<T>> {
        let slot = self
            .inner
            .extensions
            .borrow()
            .get(&TypeId::of::<T>())
            .cloned()?;
        slot.downcast::<T>().ok()
    }

    pub fn insert_extension<T: Any>(&self, value: Rc<T>) -> Result<(), HostError> {
        if self.is_closed() {
            return Err(HostError::ContextClosed(self.inner.name.clone()));
        }
        self.inner
            .extensions
            .borrow_mut()
            .insert(TypeId::of::<T>(), value);
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.inner.name)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}
