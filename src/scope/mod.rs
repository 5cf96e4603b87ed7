//! Scope tree with batched change propagation
//!
//! Mutations call `mark()`; a digest pass then re-runs every watcher in the
//! tree, depth-first, until nothing marks again. Watchers derive state from
//! state, so a burst of changes settles in a handful of passes and nothing
//! ever observes a half-applied update.
//!
//! ```text
//!              root ── PostDigest listeners (gc, projection)
//!            /   |   \
//!      object  object  object      one scope per managed object
//!     watchers, listeners: Destroy, Headers, Frame, ...
//! ```

mod digest;
mod event;
mod graph;

pub use digest::{destroy_scope, emit, run_pass, DigestState, PassOutcome};
pub use event::{Event, EventKind};
pub use graph::{GraphContext, ListenFn, ListenerId, ScopeGraph, ScopeId, WatchFn, WatcherId};
