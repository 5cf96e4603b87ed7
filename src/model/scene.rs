//! `scene` objects
//!
//! A scene lists its sources with a layout per slot:
//!
//! ```json
//! {
//!   "type": "scene",
//!   "video": [{ "sourceId": "source:video:cam", "x1": 0, "y1": 0, "x2": 1, "y2": 1,
//!               "u1": 0, "v1": 0, "u2": 1, "v2": 1 }],
//!   "audio": [{ "sourceId": "source:audio:mic", "volume": 1 }]
//! }
//! ```
//!
//! It references every listed source and keeps the native slot lists that
//! mixers hand to their engines.

use serde_json::Value;

use super::SCENE;
use crate::native::{SlotLayout, SourceSlot};
use crate::runtime::Runtime;
use crate::store::ObjectId;

/// Native source lists derived from a scene's configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneLists {
    pub video: Vec<SourceSlot>,
    pub audio: Vec<SourceSlot>,
}

fn entries<'a>(cfg: &'a Value, key: &str) -> &'a [Value] {
    cfg.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn number(entry: &Value, key: &str) -> f64 {
    entry.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// `sourceId` of every entry under `cfg[key]`
fn source_ids(rt: &Runtime, scene: &ObjectId, key: &str) -> Vec<ObjectId> {
    rt.object(scene)
        .map(|obj| {
            entries(&obj.cfg, key)
                .iter()
                .filter_map(|entry| entry.get("sourceId").and_then(Value::as_str))
                .map(ObjectId::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Slots for every entry under `cfg[key]` whose source exists
fn slots(rt: &Runtime, scene: &ObjectId, key: &str, layout: fn(&Value) -> SlotLayout) -> Vec<SourceSlot> {
    let Some(obj) = rt.object(scene) else {
        return Vec::new();
    };
    entries(&obj.cfg, key)
        .iter()
        .filter_map(|entry| {
            let source = ObjectId::from(entry.get("sourceId")?.as_str()?);
            if !rt.objects().contains(&source) {
                return None;
            }
            Some(SourceSlot {
                instance: rt.native_instance(&source),
                source,
                layout: layout(entry),
            })
        })
        .collect()
}

fn video_layout(entry: &Value) -> SlotLayout {
    SlotLayout::Video {
        x1: number(entry, "x1"),
        y1: number(entry, "y1"),
        x2: number(entry, "x2"),
        y2: number(entry, "y2"),
        u1: number(entry, "u1"),
        v1: number(entry, "v1"),
        u2: number(entry, "u2"),
        v2: number(entry, "v2"),
    }
}

fn audio_layout(entry: &Value) -> SlotLayout {
    SlotLayout::Audio {
        volume: number(entry, "volume"),
    }
}

fn build_lists(rt: &Runtime, scene: &ObjectId) -> SceneLists {
    SceneLists {
        video: slots(rt, scene, "video", video_layout),
        audio: slots(rt, scene, "audio", audio_layout),
    }
}

impl Runtime {
    /// Native source lists of a scene
    pub fn scene_lists(&self, scene: &ObjectId) -> Option<&SceneLists> {
        self.ext::<SceneLists>(scene)
    }
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create(SCENE, |rt, id| {
        let Some(obj) = rt.object_mut(id) else {
            return;
        };
        obj.ext.insert(SceneLists::default());
        let scope = obj.scope();

        let scene = id.clone();
        rt.resolve_all_with(id, "videoSources", move |rt| source_ids(rt, &scene, "video"), |_, _, _| {});
        let scene = id.clone();
        rt.resolve_all_with(id, "audioSources", move |rt| source_ids(rt, &scene, "audio"), |_, _, _| {});

        let (scene, target) = (id.clone(), id.clone());
        rt.watch_value(
            scope,
            move |rt| build_lists(rt, &scene),
            move |rt, lists: &SceneLists, _| {
                if let Some(current) = rt.ext_mut::<SceneLists>(&target) {
                    *current = lists.clone();
                }
                rt.mark();
            },
        );
    });
}
