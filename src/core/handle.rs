// Shared ownership handle
//
// Every polymorphic graphics object (renderer, device, instance) is held
// through a `Ref`. The count is atomic, so handles may be cloned and dropped
// on any thread; the object is destroyed exactly once, when the last handle
// goes away. Parents are held by their children through a `Ref`, which is
// what pins native destruction order (device before instance, pool before
// device).

use std::any::{type_name, Any};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::gfx::GfxError;

/// Reference-counted owning handle.
///
/// Cloning increments the count, moving transfers it, dropping decrements
/// it. A null handle is spelled `Option<Ref<T>>`.
pub struct Ref<T: ?Sized>(Arc<T>);

impl<T> Ref<T> {
    /// Take ownership of `value` with a count of 1.
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T: ?Sized> Ref<T> {
    /// Number of live handles to the object.
    pub fn ref_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl<T: Any + Send + Sync> Ref<T> {
    /// Erase the concrete type, keeping the same count.
    pub fn into_any(self) -> Ref<dyn Any + Send + Sync> {
        Ref(self.0)
    }
}

impl Ref<dyn Any + Send + Sync> {
    /// Narrow to a concrete type.
    ///
    /// On success the returned handle shares the count with `self`. A
    /// mismatch is reported as [`GfxError::IncompatibleCast`] rather than
    /// producing a null handle.
    pub fn cast<U: Any + Send + Sync>(&self) -> Result<Ref<U>, GfxError> {
        Arc::clone(&self.0)
            .downcast::<U>()
            .map(Ref)
            .map_err(|_| GfxError::IncompatibleCast(type_name::<U>()))
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Ref::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Ref<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&&*self.0).finish()
    }
}
