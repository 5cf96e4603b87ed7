//! Cancellation handles

use std::fmt;

use super::Runtime;

/// Undoes one registration (watcher, listener, hook, frame listener, ...)
///
/// Disposing something whose target is already gone does nothing.
pub struct Disposer(Option<Box<dyn FnOnce(&mut Runtime)>>);

impl Disposer {
    pub fn new(f: impl FnOnce(&mut Runtime) + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A disposer with nothing to undo
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn dispose(mut self, rt: &mut Runtime) {
        if let Some(f) = self.0.take() {
            f(rt);
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Disposer")
            .field(&if self.0.is_some() { "armed" } else { "noop" })
            .finish()
    }
}
