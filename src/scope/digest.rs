//! Mark/digest cycle
//!
//! ```text
//!   mark() ──► current > last ? (already pending) : current += 1
//!                                                    │
//!   pass:  last = current ──► run every live watcher ┘ (may mark again)
//!          current == last ? reset, emit PostDigest : another pass
//! ```
//! A cycle that keeps re-marking past the TTL is a watcher dependency loop
//! and panics.

use super::event::Event;
use super::graph::{GraphContext, ScopeId};

/// Digest counters
#[derive(Debug, Clone)]
pub struct DigestState {
    current: u32,
    last: u32,
    ttl: u32,
}

impl DigestState {
    pub fn new(ttl: u32) -> Self {
        Self {
            current: 0,
            last: 0,
            ttl,
        }
    }

    /// Request a pass. Idempotent while one is pending.
    ///
    /// # Panics
    ///
    /// When the cycle has been re-marked more than `ttl` times.
    pub fn mark(&mut self) {
        if self.current > self.last {
            return;
        }
        self.current += 1;
        if self.current > self.ttl {
            panic!("watcher loop exceeded {} iterations", self.ttl);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.current > self.last
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    fn begin_pass(&mut self) {
        self.last = self.current;
    }

    /// True when the pass settled the cycle
    fn finish_pass(&mut self) -> bool {
        if self.current == self.last {
            self.current = 0;
            self.last = 0;
            true
        } else {
            false
        }
    }
}

/// Outcome of [`run_pass`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing was pending
    Idle,
    /// A pass ran and something marked again
    Pending,
    /// A pass ran and the cycle settled; `PostDigest` was emitted
    Settled,
}

/// Run one digest pass if one is pending
pub fn run_pass<C: GraphContext>(ctx: &mut C) -> PassOutcome {
    if !ctx.graph().digest.is_pending() {
        return PassOutcome::Idle;
    }
    ctx.graph_mut().digest.begin_pass();

    let order = {
        let graph = ctx.graph();
        graph.walk(graph.root())
    };

    for scope in order {
        let Some(watchers) = ctx.graph().watchers_of(scope) else {
            continue;
        };
        for id in watchers {
            let Some(mut func) = ctx.graph_mut().take_watcher(id) else {
                continue;
            };
            func(ctx);
            ctx.graph_mut().restore_watcher(id, func);
        }
    }

    if ctx.graph_mut().digest.finish_pass() {
        let root = ctx.graph().root();
        emit(ctx, root, &Event::PostDigest);
        PassOutcome::Settled
    } else {
        PassOutcome::Pending
    }
}

/// Deliver `event` to every listener for its kind in the subtree at `scope`
///
/// Listeners are collected before delivery: ones registered while the event
/// is in flight do not see it, ones disposed in flight are skipped.
pub fn emit<C: GraphContext>(ctx: &mut C, scope: ScopeId, event: &Event) {
    let targets = ctx.graph().listeners_for(scope, event.kind());

    for id in targets {
        let Some(mut func) = ctx.graph_mut().take_listener(id) else {
            continue;
        };
        func(ctx, event);
        ctx.graph_mut().restore_listener(id, func);
    }
}

/// Emit `Destroy` on the subtree, then remove it
pub fn destroy_scope<C: GraphContext>(ctx: &mut C, scope: ScopeId) {
    if scope == ctx.graph().root() || !ctx.graph().is_live(scope) {
        return;
    }

    emit(ctx, scope, &Event::Destroy);
    ctx.graph_mut().detach(scope);
    ctx.graph_mut().mark();
}
