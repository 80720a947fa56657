use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// The context value a deferred callback is bound to.
///
/// Type-erased so one scheduler can carry values of any type. Cloning is a
/// reference-count bump; the value handed back by a tick future is the same
/// allocation the caller bound.
#[derive(Clone)]
pub struct BoundValue(Rc<dyn Any>);

impl BoundValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Self(value)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn ptr_eq(&self, other: &BoundValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundValue").field(&Rc::as_ptr(&self.0)).finish()
    }
}
