//! `mixer` objects
//!
//! A mixer is the user-facing output: it resolves a scene and, while at
//! least one strong frame listener is attached, runs an ephemeral
//! `video-mixer` and `audio-mixer` fed with the scene's source lists.
//! Their output is relayed on the mixer's own scope:
//!
//! ```text
//!   video-mixer ──Headers──► mixer ──VideoHeaders──► frame listeners
//!               ──Frame────►       ──VideoFrame────►
//!   audio-mixer ──Headers──►       ──AudioHeaders──►
//!               ──Frame────►       ──AudioFrame────►
//! ```
//!
//! The latest header units are cached so late listeners can be primed.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{AUDIO_MIXER, MIXER, VIDEO_MIXER};
use crate::error::{Error, Result};
use crate::media::{AccessUnit, AudioUnit, VideoUnit};
use crate::native::{HookId, SourceSlot};
use crate::runtime::{Disposer, ListenerGroup, Runtime};
use crate::scope::{Event, EventKind};
use crate::store::{Activation, ObjectId};

/// Receives a mixer's output
///
/// Every method has a no-op default; implement the ones you need.
pub trait FrameListener {
    fn video_headers(&mut self, _rt: &mut Runtime, _unit: &Arc<VideoUnit>) {}

    fn video_frame(&mut self, _rt: &mut Runtime, _unit: &Arc<VideoUnit>) {}

    fn audio_headers(&mut self, _rt: &mut Runtime, _unit: &Arc<AudioUnit>) {}

    fn audio_frame(&mut self, _rt: &mut Runtime, _unit: &Arc<AudioUnit>) {}

    /// Native video hook to install on the video mixer while attached
    fn video_hook(&self) -> Option<HookId> {
        None
    }
}

/// Options for [`Runtime::add_frame_listener`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameListenerOptions {
    /// Replay the cached header units to the new listener right away
    pub emit_init_headers: bool,

    /// Do not keep the mixer running on behalf of this listener
    pub weak: bool,
}

/// Runtime state of a mixer object
#[derive(Debug, Default)]
pub struct MixerState {
    num_frame_listeners: usize,
    video_hooks: Vec<HookId>,
    video_mixer: Option<ObjectId>,
    audio_mixer: Option<ObjectId>,
    video_headers: Option<Arc<VideoUnit>>,
    audio_headers: Option<Arc<AudioUnit>>,
}

impl MixerState {
    /// Strong frame listeners currently attached
    pub fn num_frame_listeners(&self) -> usize {
        self.num_frame_listeners
    }

    pub fn video_mixer(&self) -> Option<&ObjectId> {
        self.video_mixer.as_ref()
    }

    pub fn audio_mixer(&self) -> Option<&ObjectId> {
        self.audio_mixer.as_ref()
    }

    pub fn video_headers(&self) -> Option<&Arc<VideoUnit>> {
        self.video_headers.as_ref()
    }

    pub fn audio_headers(&self) -> Option<&Arc<AudioUnit>> {
        self.audio_headers.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Video,
    Audio,
}

impl Track {
    fn child_type(self) -> &'static str {
        match self {
            Track::Video => VIDEO_MIXER,
            Track::Audio => AUDIO_MIXER,
        }
    }

    /// Key of the mixer configuration copied into the child object
    fn cfg_key(self) -> &'static str {
        match self {
            Track::Video => "video",
            Track::Audio => "audio",
        }
    }

    fn child(self, state: &mut MixerState) -> &mut Option<ObjectId> {
        match self {
            Track::Video => &mut state.video_mixer,
            Track::Audio => &mut state.audio_mixer,
        }
    }
}

/// Configuration of the child object: `cfg[video|audio]` with our type
fn child_cfg(mixer_cfg: &Value, track: Track) -> Value {
    let mut cfg = match mixer_cfg.get(track.cfg_key()) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    cfg.insert("type".into(), Value::from(track.child_type()));
    Value::Object(cfg)
}

/// Source list the scene resolved by the mixer provides for `track`
fn scene_list(rt: &Runtime, mixer: &ObjectId, track: Track) -> Vec<SourceSlot> {
    let Some(lists) = rt.resolved(mixer, "scene").and_then(|scene| rt.scene_lists(scene)) else {
        return Vec::new();
    };
    match track {
        Track::Video => lists.video.clone(),
        Track::Audio => lists.audio.clone(),
    }
}

/// Cache a header unit and re-emit it on the mixer scope
fn relay_headers(rt: &mut Runtime, mixer: &ObjectId, unit: &AccessUnit) {
    let event = match unit {
        AccessUnit::Video(unit) => {
            if let Some(state) = rt.ext_mut::<MixerState>(mixer) {
                state.video_headers = Some(Arc::clone(unit));
            }
            Event::VideoHeaders(Arc::clone(unit))
        }
        AccessUnit::Audio(unit) => {
            if let Some(state) = rt.ext_mut::<MixerState>(mixer) {
                state.audio_headers = Some(Arc::clone(unit));
            }
            Event::AudioHeaders(Arc::clone(unit))
        }
    };
    rt.mark();
    emit_on(rt, mixer, &event);
}

fn relay_frame(rt: &mut Runtime, mixer: &ObjectId, unit: &AccessUnit) {
    let event = match unit {
        AccessUnit::Video(unit) => Event::VideoFrame(Arc::clone(unit)),
        AccessUnit::Audio(unit) => Event::AudioFrame(Arc::clone(unit)),
    };
    emit_on(rt, mixer, &event);
}

fn emit_on(rt: &mut Runtime, id: &ObjectId, event: &Event) {
    if let Some(scope) = rt.object(id).map(|obj| obj.scope()) {
        rt.emit(scope, event);
    }
}

fn start_child(rt: &mut Runtime, mixer: &ObjectId, group: &mut ListenerGroup, track: Track) {
    let Some((cfg, mixer_scope)) = rt
        .object(mixer)
        .map(|obj| (child_cfg(&obj.cfg, track), obj.scope()))
    else {
        return;
    };
    let child = match rt.create(cfg, None) {
        Ok(child) => child,
        Err(err) => {
            rt.fatal(mixer, format!("failed to create {}: {err}", track.child_type()));
            return;
        }
    };
    let Some(child_scope) = rt.object_mut(&child).map(|obj| {
        obj.ephemeral = true;
        obj.scope()
    }) else {
        return;
    };
    rt.add_ref(&child, mixer);
    if let Some(state) = rt.ext_mut::<MixerState>(mixer) {
        *track.child(state) = Some(child.clone());
    }
    tracing::debug!(obj = %mixer, child = %child, "Mixer child created");

    let owner = mixer.clone();
    group.on(rt, child_scope, EventKind::Headers, move |rt, event| {
        if let Event::Headers(unit) = event {
            relay_headers(rt, &owner, unit);
        }
    });
    let owner = mixer.clone();
    group.on(rt, child_scope, EventKind::Frame, move |rt, event| {
        if let Event::Frame(unit) = event {
            relay_frame(rt, &owner, unit);
        }
    });

    let (owner, target) = (mixer.clone(), child.clone());
    group.watch_value(
        rt,
        mixer_scope,
        move |rt| scene_list(rt, &owner, track),
        move |rt, list: &Vec<SourceSlot>, _| rt.set_sources(&target, list.clone()),
    );

    if track == Track::Video {
        let (owner, target) = (mixer.clone(), child);
        group.watch_value(
            rt,
            mixer_scope,
            move |rt| {
                rt.ext::<MixerState>(&owner)
                    .map(|state| state.video_hooks.clone())
                    .unwrap_or_default()
            },
            move |rt, hooks: &Vec<HookId>, _| rt.set_hooks(&target, hooks.clone()),
        );
    }
}

fn stop_child(rt: &mut Runtime, mixer: &ObjectId, track: Track) {
    let child = rt.ext_mut::<MixerState>(mixer).and_then(|state| {
        match track {
            Track::Video => state.video_headers = None,
            Track::Audio => state.audio_headers = None,
        }
        track.child(state).take()
    });
    if let Some(child) = child {
        rt.remove_ref(&child, mixer);
    }
}

fn child_activation(track: Track) -> Activation {
    Activation::new(
        move |rt, id, group| start_child(rt, id, group, track),
        move |rt, id| stop_child(rt, id, track),
    )
}

impl Runtime {
    /// Runtime state of a mixer
    pub fn mixer_state(&self, mixer: &ObjectId) -> Option<&MixerState> {
        self.ext::<MixerState>(mixer)
    }

    /// Attach `listener` to the output of `mixer`
    ///
    /// A strong listener keeps the mixer running until its disposer is
    /// called.
    pub fn add_frame_listener(
        &mut self,
        mixer: &ObjectId,
        listener: Rc<RefCell<dyn FrameListener>>,
        options: FrameListenerOptions,
    ) -> Result<Disposer> {
        let scope = self
            .object(mixer)
            .map(|obj| obj.scope())
            .ok_or_else(|| Error::ObjectNotFound(mixer.clone()))?;
        let hook = listener.borrow().video_hook();
        let state = self
            .ext_mut::<MixerState>(mixer)
            .ok_or_else(|| Error::ObjectNotFound(mixer.clone()))?;

        let strong = !options.weak;
        if strong {
            state.num_frame_listeners += 1;
        }
        if let Some(hook) = hook {
            state.video_hooks.push(hook);
        }
        let cached = (state.video_headers.clone(), state.audio_headers.clone());

        let mut group = ListenerGroup::new();
        let target = Rc::clone(&listener);
        group.on(self, scope, EventKind::VideoHeaders, move |rt, event| {
            if let Event::VideoHeaders(unit) = event {
                target.borrow_mut().video_headers(rt, unit);
            }
        });
        let target = Rc::clone(&listener);
        group.on(self, scope, EventKind::VideoFrame, move |rt, event| {
            if let Event::VideoFrame(unit) = event {
                target.borrow_mut().video_frame(rt, unit);
            }
        });
        let target = Rc::clone(&listener);
        group.on(self, scope, EventKind::AudioHeaders, move |rt, event| {
            if let Event::AudioHeaders(unit) = event {
                target.borrow_mut().audio_headers(rt, unit);
            }
        });
        let target = Rc::clone(&listener);
        group.on(self, scope, EventKind::AudioFrame, move |rt, event| {
            if let Event::AudioFrame(unit) = event {
                target.borrow_mut().audio_frame(rt, unit);
            }
        });

        tracing::debug!(obj = %mixer, strong = strong, "Frame listener added");
        self.mark();

        if options.emit_init_headers {
            let (video, audio) = cached;
            if let Some(unit) = audio {
                listener.borrow_mut().audio_headers(self, &unit);
            }
            if let Some(unit) = video {
                listener.borrow_mut().video_headers(self, &unit);
            }
        }

        let mixer = mixer.clone();
        Ok(Disposer::new(move |rt| {
            group.clear(rt);
            if let Some(state) = rt.ext_mut::<MixerState>(&mixer) {
                if strong {
                    state.num_frame_listeners = state.num_frame_listeners.saturating_sub(1);
                }
                if let Some(hook) = hook {
                    if let Some(pos) = state.video_hooks.iter().position(|h| *h == hook) {
                        state.video_hooks.remove(pos);
                    }
                }
            }
            tracing::debug!(obj = %mixer, strong = strong, "Frame listener removed");
            rt.mark();
        }))
    }
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create(MIXER, |rt, id| {
        let Some(obj) = rt.object_mut(id) else {
            return;
        };
        obj.ext.insert(MixerState::default());

        rt.resolve(id, "scene");
        rt.set_predicate(id, |rt, id| {
            rt.ext::<MixerState>(id)
                .is_some_and(|state| state.num_frame_listeners > 0)
        });
        rt.activation(id, "video mixer object", child_activation(Track::Video));
        rt.activation(id, "audio mixer object", child_activation(Track::Audio));
    });
}
