//! The single-threaded runtime
//!
//! `Runtime` owns the scope graph, the object store and the receiving end of
//! the native hand-off channel. Everything that mutates the graph runs on
//! the thread that owns it; native engines only ever hold an
//! [`EventSender`](crate::native::EventSender).
//!
//! ```text
//!  native threads ──(mpsc)──► process_native_events ──► Event on object scope
//!                                                          │
//!  API calls ──► create / destroy / cfg edits ──► mark ──► settle()
//!                                                          │
//!                      watchers: resolve, activation, model wiring
//! ```

mod disposer;
mod driver;
mod listener_group;

use std::rc::Rc;

use tokio::sync::mpsc;

use crate::config::RuntimeConfig;
use crate::native::{NativeBackend, NativeMessage};
use crate::scope::{self, Event, EventKind, GraphContext, PassOutcome, ScopeGraph, ScopeId};
use crate::store::ObjectStore;

pub use disposer::Disposer;
pub use driver::EventLoop;
pub use listener_group::ListenerGroup;

/// Graph, store and native hand-off for one broadcasting core
pub struct Runtime {
    graph: ScopeGraph<Runtime>,
    pub(crate) store: ObjectStore,
    pub(crate) backend: Rc<dyn NativeBackend>,
    pub(crate) native_tx: mpsc::UnboundedSender<NativeMessage>,
    pub(crate) native_rx: mpsc::UnboundedReceiver<NativeMessage>,
    pub(crate) native_generation: u64,
    after_digest: Vec<Box<dyn FnOnce(&mut Runtime)>>,
    config: RuntimeConfig,
}

impl GraphContext for Runtime {
    fn graph(&self) -> &ScopeGraph<Self> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut ScopeGraph<Self> {
        &mut self.graph
    }
}

impl Runtime {
    /// Create a runtime with no object types installed
    ///
    /// Call [`crate::model::install`] to register the built-in types.
    pub fn new(backend: Rc<dyn NativeBackend>, config: RuntimeConfig) -> Self {
        let (native_tx, native_rx) = mpsc::unbounded_channel();

        let mut rt = Self {
            graph: ScopeGraph::new(config.digest_ttl),
            store: ObjectStore::default(),
            backend,
            native_tx,
            native_rx,
            native_generation: 0,
            after_digest: Vec::new(),
            config,
        };

        let root = rt.root_scope();
        rt.on(root, EventKind::PostDigest, |rt, _| {
            rt.gc();
        });

        rt
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn graph(&self) -> &ScopeGraph<Runtime> {
        &self.graph
    }

    pub fn root_scope(&self) -> ScopeId {
        self.graph.root()
    }

    pub fn new_child_scope(&mut self, parent: ScopeId) -> Option<ScopeId> {
        self.graph.new_child(parent)
    }

    pub fn destroy_scope(&mut self, scope: ScopeId) {
        scope::destroy_scope(self, scope);
    }

    /// Request a digest pass
    pub fn mark(&mut self) {
        self.graph.mark();
    }

    pub fn is_pending(&self) -> bool {
        self.graph.digest().is_pending()
    }

    /// Run `f` on every pass until disposed
    pub fn watch(&mut self, scope: ScopeId, f: impl FnMut(&mut Runtime) + 'static) -> Disposer {
        match self.graph.add_watcher(scope, Box::new(f)) {
            Some(id) => Disposer::new(move |rt| {
                rt.graph.remove_watcher(id);
            }),
            None => Disposer::noop(),
        }
    }

    /// Recompute `value_fn` on every pass and call `listen_fn(new, old)`
    /// whenever the value differs from the previous one
    ///
    /// The first evaluation always counts as a change, with `old = None`.
    ///
    /// Values are owned snapshots compared with `PartialEq`, which covers
    /// every comparison mode a caller needs:
    /// - identity: return an id or other cheap key (`ObjectId`, `InstanceId`);
    /// - reference: return an `Rc`/`Arc` wrapped in a type comparing with
    ///   `ptr_eq`, or the pointer's address;
    /// - bounded deep equality: return a copy of just the levels that matter,
    ///   such as a `Vec<SourceSlot>` or a `serde_json::Value` subtree.
    pub fn watch_value<T, V, L>(&mut self, scope: ScopeId, value_fn: V, mut listen_fn: L) -> Disposer
    where
        T: PartialEq + 'static,
        V: Fn(&Runtime) -> T + 'static,
        L: FnMut(&mut Runtime, &T, Option<&T>) + 'static,
    {
        let mut last: Option<T> = None;
        self.watch(scope, move |rt| {
            let value = value_fn(rt);
            if last.as_ref() == Some(&value) {
                return;
            }
            listen_fn(rt, &value, last.as_ref());
            last = Some(value);
        })
    }

    /// Listen for `kind` events delivered to `scope` or any ancestor of it
    pub fn on(
        &mut self,
        scope: ScopeId,
        kind: EventKind,
        f: impl FnMut(&mut Runtime, &Event) + 'static,
    ) -> Disposer {
        match self.graph.add_listener(scope, kind, Box::new(f)) {
            Some(id) => Disposer::new(move |rt| {
                rt.graph.remove_listener(id);
            }),
            None => Disposer::noop(),
        }
    }

    /// Deliver `event` to the subtree at `scope`, depth-first
    pub fn emit(&mut self, scope: ScopeId, event: &Event) {
        scope::emit(self, scope, event);
    }

    /// Queue `f` to run once the current digest cycle settles
    pub fn after_digest(&mut self, f: impl FnOnce(&mut Runtime) + 'static) {
        self.after_digest.push(Box::new(f));
        self.mark();
    }

    /// Run one digest pass, if one is pending
    pub fn run_digest_pass(&mut self) -> PassOutcome {
        let outcome = scope::run_pass(self);
        if outcome == PassOutcome::Settled && !self.after_digest.is_empty() {
            for f in std::mem::take(&mut self.after_digest) {
                f(self);
            }
        }
        outcome
    }

    /// Run digest passes until nothing is pending. Returns the pass count.
    pub fn settle(&mut self) -> usize {
        let mut passes = 0;
        while self.run_digest_pass() != PassOutcome::Idle {
            passes += 1;
        }
        passes
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::native::testing::NullBackend;

    fn runtime() -> Runtime {
        Runtime::new(Rc::new(NullBackend), RuntimeConfig::default())
    }

    #[test]
    fn test_watch_value_fires_on_change_only() {
        let mut rt = runtime();
        let root = rt.root_scope();
        let source = Rc::new(RefCell::new(1));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let value = source.clone();
        let log = seen.clone();
        rt.watch_value(
            root,
            move |_| *value.borrow(),
            move |_, new: &i32, old: Option<&i32>| log.borrow_mut().push((*new, old.copied())),
        );

        rt.settle();
        rt.mark();
        rt.settle();
        *source.borrow_mut() = 2;
        rt.mark();
        rt.settle();

        assert_eq!(*seen.borrow(), vec![(1, None), (2, Some(1))]);
    }

    #[test]
    fn test_watch_value_reference_and_deep_modes() {
        let mut rt = runtime();
        let root = rt.root_scope();
        let shared = Rc::new(RefCell::new(Rc::new(vec![1, 2])));
        let by_ref = Rc::new(RefCell::new(0));
        let by_content = Rc::new(RefCell::new(0));

        let value = shared.clone();
        let count = by_ref.clone();
        rt.watch_value(
            root,
            move |_| Rc::as_ptr(&value.borrow()) as usize,
            move |_, _: &usize, _| *count.borrow_mut() += 1,
        );
        let value = shared.clone();
        let count = by_content.clone();
        rt.watch_value(
            root,
            move |_| (**value.borrow()).clone(),
            move |_, _: &Vec<i32>, _| *count.borrow_mut() += 1,
        );
        rt.settle();

        // Same content behind a new allocation
        let replacement = Rc::new(vec![1, 2]);
        let _previous = std::mem::replace(&mut *shared.borrow_mut(), replacement);
        rt.mark();
        rt.settle();

        assert_eq!(*by_ref.borrow(), 2);
        assert_eq!(*by_content.borrow(), 1);
    }

    #[test]
    fn test_disposed_watcher_stops_running() {
        let mut rt = runtime();
        let root = rt.root_scope();
        let runs = Rc::new(RefCell::new(0));

        let counter = runs.clone();
        let disposer = rt.watch(root, move |_| *counter.borrow_mut() += 1);
        rt.settle();
        disposer.dispose(&mut rt);
        rt.mark();
        rt.settle();

        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn test_after_digest_runs_once_after_settling() {
        let mut rt = runtime();
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        rt.after_digest(move |_| *counter.borrow_mut() += 1);
        rt.settle();
        rt.mark();
        rt.settle();

        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_listener_group_clears_registrations() {
        let mut rt = runtime();
        let root = rt.root_scope();
        let scope = rt.new_child_scope(root).unwrap();
        let hits = Rc::new(RefCell::new(0));

        let mut group = ListenerGroup::new();
        let counter = hits.clone();
        group.on(&mut rt, scope, EventKind::SourcesChanged, move |_, _| {
            *counter.borrow_mut() += 1
        });
        group.watch(&mut rt, scope, |_| {});
        assert_eq!(group.len(), 2);

        rt.emit(scope, &Event::SourcesChanged);
        group.clear(&mut rt);
        rt.emit(scope, &Event::SourcesChanged);

        assert!(group.is_empty());
        assert_eq!(*hits.borrow(), 1);
        // root scope keeps only the gc listener
        assert_eq!(rt.graph().watcher_count(), 0);
        assert_eq!(rt.graph().listener_count(), 1);
    }

    #[test]
    fn test_disposer_after_scope_destroyed_is_noop() {
        let mut rt = runtime();
        let root = rt.root_scope();
        let scope = rt.new_child_scope(root).unwrap();

        let disposer = rt.on(scope, EventKind::Destroy, |_, _| {});
        rt.destroy_scope(scope);
        disposer.dispose(&mut rt);

        assert!(!rt.graph().is_live(scope));
        rt.watch(scope, |_| {}).dispose(&mut rt);
        assert_eq!(rt.graph().watcher_count(), 0);
    }
}
