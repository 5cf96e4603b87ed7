//! Scope tree storage
//!
//! Scopes, watchers and listeners live in id-keyed arenas. A callback is
//! taken out of its slot while it runs, so it may freely register or dispose
//! other callbacks (or itself) through the context it receives.

use std::collections::HashMap;
use std::fmt;

use super::digest::DigestState;
use super::event::{Event, EventKind};

/// Handle to a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

/// Handle to a registered watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

/// Handle to a registered event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

pub type WatchFn<C> = Box<dyn FnMut(&mut C)>;
pub type ListenFn<C> = Box<dyn FnMut(&mut C, &Event)>;

/// Implemented by whatever owns the graph, so callbacks can reach the
/// rest of that state while they run
pub trait GraphContext: Sized + 'static {
    fn graph(&self) -> &ScopeGraph<Self>;
    fn graph_mut(&mut self) -> &mut ScopeGraph<Self>;
}

#[derive(Debug, Default)]
struct ScopeNode {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    watchers: Vec<WatcherId>,
    listeners: HashMap<EventKind, Vec<ListenerId>>,
    destroyed: bool,
}

struct WatcherSlot<C> {
    scope: ScopeId,
    func: Option<WatchFn<C>>,
}

struct ListenerSlot<C> {
    scope: ScopeId,
    kind: EventKind,
    func: Option<ListenFn<C>>,
}

/// Rooted tree of scopes with their watchers and listeners
pub struct ScopeGraph<C> {
    root: ScopeId,
    scopes: HashMap<ScopeId, ScopeNode>,
    watchers: HashMap<WatcherId, WatcherSlot<C>>,
    listeners: HashMap<ListenerId, ListenerSlot<C>>,
    pub(super) digest: DigestState,
    next_id: u64,
}

impl<C> ScopeGraph<C> {
    /// Create a graph holding only the root scope
    ///
    /// The first digest is already pending.
    pub fn new(ttl: u32) -> Self {
        let root = ScopeId(0);
        let mut scopes = HashMap::new();
        scopes.insert(root, ScopeNode::default());

        let mut graph = Self {
            root,
            scopes,
            watchers: HashMap::new(),
            listeners: HashMap::new(),
            digest: DigestState::new(ttl),
            next_id: 1,
        };
        graph.digest.mark();
        graph
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn digest(&self) -> &DigestState {
        &self.digest
    }

    /// Request a digest pass
    pub fn mark(&mut self) {
        self.digest.mark();
    }

    pub fn is_live(&self, scope: ScopeId) -> bool {
        self.scopes.get(&scope).is_some_and(|node| !node.destroyed)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(&scope).and_then(|node| node.parent)
    }

    pub fn children(&self, scope: ScopeId) -> &[ScopeId] {
        self.scopes
            .get(&scope)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Create a child of `parent`, or `None` if the parent is gone
    pub fn new_child(&mut self, parent: ScopeId) -> Option<ScopeId> {
        if !self.is_live(parent) {
            return None;
        }

        let id = ScopeId(self.next_id());
        self.scopes.insert(
            id,
            ScopeNode {
                parent: Some(parent),
                ..ScopeNode::default()
            },
        );
        if let Some(node) = self.scopes.get_mut(&parent) {
            node.children.push(id);
        }
        self.mark();
        Some(id)
    }

    /// Create a direct child of the root
    pub fn new_root_child(&mut self) -> ScopeId {
        let id = ScopeId(self.next_id());
        self.scopes.insert(
            id,
            ScopeNode {
                parent: Some(self.root),
                ..ScopeNode::default()
            },
        );
        if let Some(node) = self.scopes.get_mut(&self.root) {
            node.children.push(id);
        }
        self.mark();
        id
    }

    /// Register a watcher; it first runs on the next pass
    pub fn add_watcher(&mut self, scope: ScopeId, func: WatchFn<C>) -> Option<WatcherId> {
        if !self.is_live(scope) {
            return None;
        }

        let id = WatcherId(self.next_id());
        self.watchers.insert(
            id,
            WatcherSlot {
                scope,
                func: Some(func),
            },
        );
        if let Some(node) = self.scopes.get_mut(&scope) {
            node.watchers.push(id);
        }
        self.mark();
        Some(id)
    }

    /// Remove a watcher. Returns false if it was already gone.
    pub fn remove_watcher(&mut self, id: WatcherId) -> bool {
        let Some(slot) = self.watchers.remove(&id) else {
            return false;
        };
        if let Some(node) = self.scopes.get_mut(&slot.scope) {
            node.watchers.retain(|w| *w != id);
        }
        true
    }

    pub fn add_listener(
        &mut self,
        scope: ScopeId,
        kind: EventKind,
        func: ListenFn<C>,
    ) -> Option<ListenerId> {
        if !self.is_live(scope) {
            return None;
        }

        let id = ListenerId(self.next_id());
        self.listeners.insert(
            id,
            ListenerSlot {
                scope,
                kind,
                func: Some(func),
            },
        );
        if let Some(node) = self.scopes.get_mut(&scope) {
            node.listeners.entry(kind).or_default().push(id);
        }
        Some(id)
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let Some(slot) = self.listeners.remove(&id) else {
            return false;
        };
        if let Some(list) = self
            .scopes
            .get_mut(&slot.scope)
            .and_then(|node| node.listeners.get_mut(&slot.kind))
        {
            list.retain(|l| *l != id);
        }
        true
    }

    /// Live scopes of the subtree at `from`, depth-first pre-order
    pub fn walk(&self, from: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];

        while let Some(id) = stack.pop() {
            let Some(node) = self.scopes.get(&id) else {
                continue;
            };
            if node.destroyed {
                continue;
            }
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }

        order
    }

    /// Watchers of a live scope, in registration order
    pub(super) fn watchers_of(&self, scope: ScopeId) -> Option<Vec<WatcherId>> {
        self.scopes
            .get(&scope)
            .filter(|node| !node.destroyed)
            .map(|node| node.watchers.clone())
    }

    /// Listeners for `kind` across the live subtree at `from`
    pub(super) fn listeners_for(&self, from: ScopeId, kind: EventKind) -> Vec<ListenerId> {
        self.walk(from)
            .into_iter()
            .filter_map(|scope| self.scopes.get(&scope))
            .filter_map(|node| node.listeners.get(&kind))
            .flat_map(|list| list.iter().copied())
            .collect()
    }

    pub(super) fn take_watcher(&mut self, id: WatcherId) -> Option<WatchFn<C>> {
        let slot = self.watchers.get_mut(&id)?;
        if !self.scopes.get(&slot.scope).is_some_and(|node| !node.destroyed) {
            return None;
        }
        slot.func.take()
    }

    pub(super) fn restore_watcher(&mut self, id: WatcherId, func: WatchFn<C>) {
        if let Some(slot) = self.watchers.get_mut(&id) {
            if slot.func.is_none() {
                slot.func = Some(func);
            }
        }
    }

    pub(super) fn take_listener(&mut self, id: ListenerId) -> Option<ListenFn<C>> {
        let slot = self.listeners.get_mut(&id)?;
        if !self.scopes.get(&slot.scope).is_some_and(|node| !node.destroyed) {
            return None;
        }
        slot.func.take()
    }

    pub(super) fn restore_listener(&mut self, id: ListenerId, func: ListenFn<C>) {
        if let Some(slot) = self.listeners.get_mut(&id) {
            if slot.func.is_none() {
                slot.func = Some(func);
            }
        }
    }

    /// Tear down the subtree at `scope`, dropping its watchers and listeners
    ///
    /// Returns the removed scope ids. The root is never removed.
    pub(super) fn detach(&mut self, scope: ScopeId) -> Vec<ScopeId> {
        if scope == self.root || !self.scopes.contains_key(&scope) {
            return Vec::new();
        }

        let mut removed = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.scopes.get_mut(&id) {
                node.destroyed = true;
                stack.extend(node.children.iter().copied());
                removed.push(id);
            }
        }

        if let Some(parent) = self.parent(scope) {
            if let Some(node) = self.scopes.get_mut(&parent) {
                node.children.retain(|c| *c != scope);
            }
        }

        for id in &removed {
            if let Some(node) = self.scopes.remove(id) {
                for watcher in node.watchers {
                    self.watchers.remove(&watcher);
                }
                for listener in node.listeners.into_values().flatten() {
                    self.listeners.remove(&listener);
                }
            }
        }

        removed
    }
}
