//! `source:` objects
//!
//! A source runs its native capture while some mixer consumes it, or always
//! when `cfg.warm` is set. Video sources count referencing `video-mixer`
//! objects as consumers, audio sources count `audio-mixer` objects.

use serde_json::Value;

use super::{referrers_of_type, AUDIO_MIXER, VIDEO_MIXER};
use crate::native::ResourceKind;
use crate::runtime::Runtime;
use crate::store::{Activation, ObjectId};

/// Number of mixers currently consuming the source `id`
pub fn num_consumers(rt: &Runtime, id: &ObjectId) -> usize {
    let Some(obj) = rt.object(id) else {
        return 0;
    };
    let type_name = obj.type_name();
    if type_name.starts_with("source:video:") {
        referrers_of_type(rt, id, VIDEO_MIXER)
    } else if type_name.starts_with("source:audio:") {
        referrers_of_type(rt, id, AUDIO_MIXER)
    } else {
        0
    }
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create("source:", |rt, id| {
        rt.set_predicate(id, |rt, id| {
            let warm = rt
                .object(id)
                .and_then(|obj| obj.cfg.get("warm"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            warm || num_consumers(rt, id) > 0
        });

        rt.activation(
            id,
            "native source",
            Activation::new(
                |rt, id, _| {
                    rt.start_native(id, ResourceKind::Source, None);
                },
                |rt, id| rt.stop_native(id),
            ),
        );
    });
}
