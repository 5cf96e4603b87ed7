//! `stream:` objects
//!
//! A stream is an output fed by one mixer. It resolves `cfg.mixerId` and,
//! while it has a mixer and is switched on, holds a strong frame listener
//! on it. The mixer's output is re-emitted on the stream's own scope, so
//! concrete outputs only listen there:
//!
//! ```text
//!   mixer ──VideoHeaders/VideoFrame──► stream ──► output listeners
//!         ──AudioHeaders/AudioFrame──►
//! ```
//!
//! `cfg.autostart` decides whether a new stream starts switched on.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use super::{FrameListener, FrameListenerOptions};
use crate::media::{AudioUnit, VideoUnit};
use crate::runtime::{ListenerGroup, Runtime};
use crate::scope::Event;
use crate::store::{Activation, ObjectId};

/// Type prefix shared by every stream
pub const STREAM: &str = "stream:";

/// Runtime state of a stream object
#[derive(Debug, Default)]
struct StreamState {
    active: bool,
}

/// Re-emits a mixer's output on the stream scope
struct Relay {
    stream: ObjectId,
}

impl Relay {
    fn emit(&self, rt: &mut Runtime, event: Event) {
        if let Some(scope) = rt.object(&self.stream).map(|obj| obj.scope()) {
            rt.emit(scope, &event);
        }
    }
}

impl FrameListener for Relay {
    fn video_headers(&mut self, rt: &mut Runtime, unit: &Arc<VideoUnit>) {
        self.emit(rt, Event::VideoHeaders(Arc::clone(unit)));
    }

    fn video_frame(&mut self, rt: &mut Runtime, unit: &Arc<VideoUnit>) {
        self.emit(rt, Event::VideoFrame(Arc::clone(unit)));
    }

    fn audio_headers(&mut self, rt: &mut Runtime, unit: &Arc<AudioUnit>) {
        self.emit(rt, Event::AudioHeaders(Arc::clone(unit)));
    }

    fn audio_frame(&mut self, rt: &mut Runtime, unit: &Arc<AudioUnit>) {
        self.emit(rt, Event::AudioFrame(Arc::clone(unit)));
    }
}

impl Runtime {
    /// Whether the stream `id` is switched on
    pub fn stream_active(&self, id: &ObjectId) -> bool {
        self.ext::<StreamState>(id).is_some_and(|state| state.active)
    }

    /// Switch the stream `id` on or off
    pub fn set_stream_active(&mut self, id: &ObjectId, active: bool) {
        let Some(state) = self.ext_mut::<StreamState>(id) else {
            return;
        };
        if state.active != active {
            state.active = active;
            tracing::info!(obj = %id, active = active, "Stream switched");
            self.mark();
        }
    }
}

fn start_output(rt: &mut Runtime, id: &ObjectId, group: &mut ListenerGroup) {
    let Some(mixer) = rt.resolved(id, "mixer").cloned() else {
        return;
    };
    let relay = Rc::new(RefCell::new(Relay { stream: id.clone() }));
    let options = FrameListenerOptions {
        emit_init_headers: true,
        weak: false,
    };
    match rt.add_frame_listener(&mixer, relay, options) {
        Ok(disposer) => group.add(disposer),
        Err(err) => {
            rt.fatal(id, err);
            return;
        }
    }
    tracing::debug!(obj = %id, mixer = %mixer, "Stream attached to mixer");

    // A different mixer means a fresh listener
    let Some(scope) = rt.object(id).map(|obj| obj.scope()) else {
        return;
    };
    let (owner, stream) = (id.clone(), id.clone());
    group.watch_value(
        rt,
        scope,
        move |rt| rt.resolved(&owner, "mixer").cloned(),
        move |rt, current: &Option<ObjectId>, _| {
            if current.as_ref().is_some_and(|current| *current != mixer) {
                rt.restart(&stream);
            }
        },
    );
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create(STREAM, |rt, id| {
        rt.resolve(id, "mixer");

        let autostart = rt
            .object(id)
            .and_then(|obj| obj.cfg.get("autostart"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(obj) = rt.object_mut(id) {
            obj.ext.insert(StreamState { active: autostart });
        }

        rt.set_predicate(id, |rt, id| {
            rt.resolved(id, "mixer").is_some() && rt.stream_active(id)
        });

        rt.activation(id, "output", Activation::new(start_output, |_, _| {}));
    });
}
