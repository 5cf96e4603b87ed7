//! Built-in object types
//!
//! Each type is a set of creation hooks that wire an object's resolutions
//! and activations. Nothing here is called directly after creation; the
//! digest drives everything from the configuration and reference counts.
//!
//! ```text
//!   root:livecast ──► scene ─────────────► source:video:*
//!        │              ▲                   source:audio:*
//!        └────────► mixer                        ▲
//!                     │ (while listened to)      │ set_sources
//!                     ├──► video-mixer ──────────┤
//!                     │        └──► clock:software
//!                     └──► audio-mixer ──────────┘
//!
//!   root:livecast ──► stream:* ──(strong frame listener)──► mixer
//! ```

mod audio_mixer;
mod clock;
mod mixer;
mod root;
mod scene;
mod source;
mod stream;
mod video_mixer;

use crate::native::{HookId, SourceSlot};
use crate::runtime::Runtime;
use crate::scope::{Event, EventKind};
use crate::store::ObjectId;

pub use mixer::{FrameListener, FrameListenerOptions, MixerState};
pub use root::{default_root_cfg, ROOT_ID};
pub use scene::SceneLists;
pub use source::num_consumers;
pub use stream::STREAM;

pub const SCENE: &str = "scene";
pub const MIXER: &str = "mixer";
pub const VIDEO_MIXER: &str = "video-mixer";
pub const AUDIO_MIXER: &str = "audio-mixer";
pub const SOFTWARE_CLOCK: &str = "clock:software";

/// Register every built-in type on `rt`
///
/// Call once, before creating objects. Hooks only apply to objects created
/// afterwards.
pub fn install(rt: &mut Runtime) {
    root::install(rt);
    source::install(rt);
    scene::install(rt);
    clock::install(rt);
    video_mixer::install(rt);
    audio_mixer::install(rt);
    mixer::install(rt);
    stream::install(rt);
    tracing::debug!("Object types installed");
}

/// Source list and hooks of a `video-mixer` or `audio-mixer` object
#[derive(Debug, Default)]
pub struct MixerInputs {
    pub sources: Vec<SourceSlot>,
    pub hooks: Vec<HookId>,
}

impl Runtime {
    /// Replace the source list of a `video-mixer` or `audio-mixer`
    ///
    /// The mixer references every listed source, once per slot.
    pub fn set_sources(&mut self, owner: &ObjectId, sources: Vec<SourceSlot>) {
        let Some(inputs) = self.ext_mut::<MixerInputs>(owner) else {
            return;
        };
        let previous = std::mem::replace(&mut inputs.sources, sources.clone());

        for slot in &sources {
            self.add_ref(&slot.source, owner);
        }
        for slot in &previous {
            self.remove_ref(&slot.source, owner);
        }

        if let Some(scope) = self.object(owner).map(|obj| obj.scope()) {
            self.emit(scope, &Event::SourcesChanged);
        }
    }

    /// Replace the hook list of a `video-mixer`
    pub fn set_hooks(&mut self, owner: &ObjectId, hooks: Vec<HookId>) {
        let Some(inputs) = self.ext_mut::<MixerInputs>(owner) else {
            return;
        };
        inputs.hooks = hooks;

        if let Some(scope) = self.object(owner).map(|obj| obj.scope()) {
            self.emit(scope, &Event::HooksChanged);
        }
    }

    /// Current source list of a `video-mixer` or `audio-mixer`
    pub fn mixer_sources(&self, owner: &ObjectId) -> &[SourceSlot] {
        self.ext::<MixerInputs>(owner)
            .map(|inputs| inputs.sources.as_slice())
            .unwrap_or(&[])
    }
}

/// Attach [`MixerInputs`] to a new mixer object
fn init_inputs(rt: &mut Runtime, id: &ObjectId) {
    let Some(obj) = rt.object_mut(id) else {
        return;
    };
    obj.ext.insert(MixerInputs::default());
    let scope = obj.scope();

    let owner = id.clone();
    rt.on(scope, EventKind::Destroy, move |rt, _| {
        let sources = rt
            .ext_mut::<MixerInputs>(&owner)
            .map(|inputs| std::mem::take(&mut inputs.sources))
            .unwrap_or_default();
        for slot in &sources {
            rt.remove_ref(&slot.source, &owner);
        }
    });
}

/// Push the current source list to the native mixer
fn push_sources(rt: &mut Runtime, id: &ObjectId) {
    let sources = rt.mixer_sources(id).to_vec();
    rt.native_set_sources(id, &sources);
}

/// Number of distinct objects of type `type_name` referencing `id`
fn referrers_of_type(rt: &Runtime, id: &ObjectId, type_name: &str) -> usize {
    let Some(obj) = rt.object(id) else {
        return 0;
    };
    obj.refs()
        .keys()
        .filter(|from| rt.object(from).is_some_and(|other| other.type_name() == type_name))
        .count()
}
