//! `video-mixer` objects
//!
//! Created on demand by a mixer. The native video mixer needs a running
//! clock, so the object first creates and references its own clock and only
//! then starts the engine, driven by that clock's instance.

use serde_json::{json, Map, Value};

use super::{init_inputs, push_sources, MixerInputs, SOFTWARE_CLOCK, VIDEO_MIXER};
use crate::native::ResourceKind;
use crate::runtime::Runtime;
use crate::scope::EventKind;
use crate::store::{Activation, ObjectId};

const DEFAULT_WIDTH: u64 = 1280;
const DEFAULT_HEIGHT: u64 = 720;

/// The clock a video mixer created for itself
#[derive(Debug, Default)]
struct MixerClock(Option<ObjectId>);

fn apply_defaults(cfg: &mut Map<String, Value>) {
    cfg.entry("width").or_insert(Value::from(DEFAULT_WIDTH));
    cfg.entry("height").or_insert(Value::from(DEFAULT_HEIGHT));
    cfg.entry("clock")
        .or_insert_with(|| json!({ "type": SOFTWARE_CLOCK }));
}

fn clock_instance(rt: &Runtime, id: &ObjectId) -> Option<crate::native::InstanceId> {
    let clock = rt.ext::<MixerClock>(id)?.0.as_ref()?;
    rt.native_instance(clock)
}

fn push_hooks(rt: &mut Runtime, id: &ObjectId) {
    let hooks = rt
        .ext::<MixerInputs>(id)
        .map(|inputs| inputs.hooks.clone())
        .unwrap_or_default();
    rt.native_set_hooks(id, &hooks);
}

fn start_clock(rt: &mut Runtime, id: &ObjectId) {
    let cfg = rt
        .object(id)
        .and_then(|obj| obj.cfg.get("clock"))
        .cloned()
        .unwrap_or_else(|| json!({ "type": SOFTWARE_CLOCK }));

    let clock = match rt.create(cfg, None) {
        Ok(clock) => clock,
        Err(err) => {
            rt.fatal(id, format!("failed to create clock: {err}"));
            return;
        }
    };
    if let Some(obj) = rt.object_mut(&clock) {
        obj.ephemeral = true;
    }
    rt.add_ref(&clock, id);
    if let Some(slot) = rt.ext_mut::<MixerClock>(id) {
        slot.0 = Some(clock);
    }
}

fn stop_clock(rt: &mut Runtime, id: &ObjectId) {
    let clock = rt.ext_mut::<MixerClock>(id).and_then(|slot| slot.0.take());
    if let Some(clock) = clock {
        rt.remove_ref(&clock, id);
    }
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create(VIDEO_MIXER, |rt, id| {
        init_inputs(rt, id);
        let Some(obj) = rt.object_mut(id) else {
            return;
        };
        if let Value::Object(cfg) = &mut obj.cfg {
            apply_defaults(cfg);
        }
        obj.ext.insert(MixerClock::default());

        rt.activation(id, "video clock", Activation::new(|rt, id, _| start_clock(rt, id), stop_clock));

        rt.activation(
            id,
            "native video mixer",
            Activation::new(
                |rt, id, group| {
                    let clock = clock_instance(rt, id);
                    if !rt.start_native(id, ResourceKind::VideoMixer, clock) {
                        return;
                    }
                    push_sources(rt, id);
                    push_hooks(rt, id);

                    let Some(scope) = rt.object(id).map(|obj| obj.scope()) else {
                        return;
                    };
                    let owner = id.clone();
                    group.on(rt, scope, EventKind::SourcesChanged, move |rt, _| push_sources(rt, &owner));
                    let owner = id.clone();
                    group.on(rt, scope, EventKind::HooksChanged, move |rt, _| push_hooks(rt, &owner));
                },
                |rt, id| rt.stop_native(id),
            )
            .with_cond(|rt, id| clock_instance(rt, id).is_some()),
        );
    });
}
