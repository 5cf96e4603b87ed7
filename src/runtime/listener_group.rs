//! Disposer collection scoped to one activation run

use super::{Disposer, Runtime};
use crate::scope::{Event, EventKind, ScopeId};

/// Collects disposers so they can be torn down together
///
/// Handed to an activation's `start`; cleared right before its `stop`.
#[derive(Debug, Default)]
pub struct ListenerGroup {
    disposers: Vec<Disposer>,
}

impl ListenerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, disposer: Disposer) {
        self.disposers.push(disposer);
    }

    /// `Runtime::on`, disposed with the group
    pub fn on(
        &mut self,
        rt: &mut Runtime,
        scope: ScopeId,
        kind: EventKind,
        f: impl FnMut(&mut Runtime, &Event) + 'static,
    ) {
        let disposer = rt.on(scope, kind, f);
        self.add(disposer);
    }

    /// `Runtime::watch`, disposed with the group
    pub fn watch(&mut self, rt: &mut Runtime, scope: ScopeId, f: impl FnMut(&mut Runtime) + 'static) {
        let disposer = rt.watch(scope, f);
        self.add(disposer);
    }

    /// `Runtime::watch_value`, disposed with the group
    pub fn watch_value<T, V, L>(&mut self, rt: &mut Runtime, scope: ScopeId, value_fn: V, listen_fn: L)
    where
        T: PartialEq + 'static,
        V: Fn(&Runtime) -> T + 'static,
        L: FnMut(&mut Runtime, &T, Option<&T>) + 'static,
    {
        let disposer = rt.watch_value(scope, value_fn, listen_fn);
        self.add(disposer);
    }

    pub fn len(&self) -> usize {
        self.disposers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposers.is_empty()
    }

    /// Dispose everything, in reverse registration order
    pub fn clear(&mut self, rt: &mut Runtime) {
        while let Some(disposer) = self.disposers.pop() {
            disposer.dispose(rt);
        }
    }
}
