//! Activation state machine
//!
//! An activation watches a boolean condition for its object and runs
//! `start` on every false to true edge and `stop` on every true to false
//! edge. Listeners and watchers `start` registers through its
//! [`ListenerGroup`] are torn down right before `stop` runs.
//!
//! ```text
//!              cond && !has_error && !restarting
//!   inactive ───────────────────────────────────► active
//!      ▲                                            │
//!      └──────── cond false, fatal, restart ────────┘
//!                      or object destroyed
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{Instant, SystemTime};

use super::{Cond, ObjectId};
use crate::runtime::{Disposer, ListenerGroup, Runtime};
use crate::scope::EventKind;

type StartFn = Box<dyn FnMut(&mut Runtime, &ObjectId, &mut ListenerGroup)>;
type StopFn = Box<dyn FnMut(&mut Runtime, &ObjectId)>;

/// Start/stop callbacks plus an optional condition
pub struct Activation {
    cond: Option<Cond>,
    start: StartFn,
    stop: StopFn,
}

impl Activation {
    pub fn new(
        start: impl FnMut(&mut Runtime, &ObjectId, &mut ListenerGroup) + 'static,
        stop: impl FnMut(&mut Runtime, &ObjectId) + 'static,
    ) -> Self {
        Self {
            cond: None,
            start: Box::new(start),
            stop: Box::new(stop),
        }
    }

    /// Replace the object's own predicate with `cond`
    ///
    /// The error and restart flags are always checked on top of it.
    pub fn with_cond(mut self, cond: impl Fn(&Runtime, &ObjectId) -> bool + 'static) -> Self {
        self.cond = Some(Rc::new(cond));
        self
    }
}

struct State {
    name: String,
    start: Option<StartFn>,
    stop: Option<StopFn>,
    group: ListenerGroup,
    started: Option<Instant>,
}

type SharedState = Rc<RefCell<State>>;

fn run_start(rt: &mut Runtime, owner: &ObjectId, state: &SharedState) {
    let (name, start, mut group) = {
        let mut st = state.borrow_mut();
        if st.started.is_some() {
            return;
        }
        st.started = Some(Instant::now());
        (st.name.clone(), st.start.take(), std::mem::take(&mut st.group))
    };

    if let Some(obj) = rt.object_mut(owner) {
        obj.activations.insert(name.clone(), Some(SystemTime::now()));
    }
    tracing::info!(obj = %owner, activation = %name, "Activation started");

    let mut start = start;
    if let Some(f) = start.as_mut() {
        f(rt, owner, &mut group);
    }

    let mut st = state.borrow_mut();
    st.start = start;
    st.group = group;
}

fn run_stop(rt: &mut Runtime, owner: &ObjectId, state: &SharedState) {
    let (name, started, stop, mut group) = {
        let mut st = state.borrow_mut();
        let Some(started) = st.started.take() else {
            return;
        };
        (
            st.name.clone(),
            started,
            st.stop.take(),
            std::mem::take(&mut st.group),
        )
    };

    if let Some(obj) = rt.object_mut(owner) {
        obj.activations.insert(name.clone(), None);
    }
    tracing::info!(
        obj = %owner,
        activation = %name,
        runtime_ms = started.elapsed().as_millis() as u64,
        "Activation stopped"
    );

    group.clear(rt);
    let mut stop = stop;
    if let Some(f) = stop.as_mut() {
        f(rt, owner);
    }

    let mut st = state.borrow_mut();
    st.stop = stop;
    st.group = group;
}

impl Runtime {
    /// Attach the activation `name` to `owner`
    ///
    /// The returned disposer removes the activation, stopping it first if it
    /// is running.
    pub fn activation(&mut self, owner: &ObjectId, name: &str, activation: Activation) -> Disposer {
        let Some(scope) = self.object(owner).map(|obj| obj.scope()) else {
            return Disposer::noop();
        };
        if let Some(obj) = self.object_mut(owner) {
            obj.activations.insert(name.to_string(), None);
        }

        let Activation { cond, start, stop } = activation;
        let state: SharedState = Rc::new(RefCell::new(State {
            name: name.to_string(),
            start: Some(start),
            stop: Some(stop),
            group: ListenerGroup::new(),
            started: None,
        }));

        let id = owner.clone();
        let value_fn = move |rt: &Runtime| {
            if !rt.activation_cond(&id) {
                return false;
            }
            match &cond {
                Some(cond) => cond(rt, &id),
                None => rt
                    .object(&id)
                    .and_then(|obj| obj.predicate.clone())
                    .map_or(true, |predicate| predicate(rt, &id)),
            }
        };

        let (id, st) = (owner.clone(), Rc::clone(&state));
        let watcher = self.watch_value(scope, value_fn, move |rt, active: &bool, _| {
            if *active {
                run_start(rt, &id, &st);
            } else {
                run_stop(rt, &id, &st);
            }
        });

        let (id, st) = (owner.clone(), Rc::clone(&state));
        let listener = self.on(scope, EventKind::Destroy, move |rt, _| run_stop(rt, &id, &st));

        let (id, slot) = (owner.clone(), name.to_string());
        Disposer::new(move |rt| {
            watcher.dispose(rt);
            listener.dispose(rt);
            run_stop(rt, &id, &state);
            if let Some(obj) = rt.object_mut(&id) {
                obj.activations.remove(&slot);
            }
        })
    }

    /// Base condition every activation shares
    pub fn activation_cond(&self, id: &ObjectId) -> bool {
        self.object(id)
            .is_some_and(|obj| !obj.has_error && !obj.restarting && !obj.destroying)
    }

    /// Set the predicate used by activations on `id` that bring no condition
    pub fn set_predicate(&mut self, id: &ObjectId, predicate: impl Fn(&Runtime, &ObjectId) -> bool + 'static) {
        if let Some(obj) = self.object_mut(id) {
            obj.predicate = Some(Rc::new(predicate));
        }
        self.mark();
    }

    /// Flag `id` as failed, stopping its activations on the next pass
    pub fn fatal(&mut self, id: &ObjectId, reason: impl fmt::Display) {
        tracing::error!(obj = %id, "{}", reason);
        if let Some(obj) = self.object_mut(id) {
            obj.has_error = true;
        }
        self.mark();
    }

    /// Allow a failed object to activate again
    pub fn clear_error(&mut self, id: &ObjectId) {
        let cleared = self.object_mut(id).is_some_and(|obj| {
            let was_set = obj.has_error;
            obj.has_error = false;
            was_set
        });
        if cleared {
            tracing::info!(obj = %id, "Error cleared");
            self.mark();
        }
    }

    /// Stop every activation of `id` and start them again after the
    /// current digest cycle settles
    pub fn restart(&mut self, id: &ObjectId) {
        let Some(obj) = self.object_mut(id) else {
            return;
        };
        if obj.restarting {
            return;
        }
        obj.restarting = true;
        tracing::info!(obj = %id, "Restarting");
        self.mark();

        let id = id.clone();
        self.after_digest(move |rt| {
            if let Some(obj) = rt.object_mut(&id) {
                obj.restarting = false;
            }
            rt.mark();
        });
    }
}
