//! `audio-mixer` objects

use super::{init_inputs, push_sources, AUDIO_MIXER};
use crate::native::ResourceKind;
use crate::runtime::Runtime;
use crate::scope::EventKind;
use crate::store::Activation;

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create(AUDIO_MIXER, |rt, id| {
        init_inputs(rt, id);

        rt.activation(
            id,
            "native audio mixer",
            Activation::new(
                |rt, id, group| {
                    if !rt.start_native(id, ResourceKind::AudioMixer, None) {
                        return;
                    }
                    push_sources(rt, id);

                    let Some(scope) = rt.object(id).map(|obj| obj.scope()) else {
                        return;
                    };
                    let owner = id.clone();
                    group.on(rt, scope, EventKind::SourcesChanged, move |rt, _| push_sources(rt, &owner));
                },
                |rt, id| rt.stop_native(id),
            ),
        );
    });
}
