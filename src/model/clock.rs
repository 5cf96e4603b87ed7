//! `clock:` objects
//!
//! A clock ticks while something references it. The video mixer creates
//! its own ephemeral clock, so in practice a clock lives and dies with the
//! mixer that drives it.

use serde_json::{Map, Value};

use super::SOFTWARE_CLOCK;
use crate::native::ResourceKind;
use crate::runtime::Runtime;
use crate::store::Activation;

const DEFAULT_NUMERATOR: u64 = 1;
const DEFAULT_DENOMINATOR: u64 = 30;

/// Fill in the tick rate of a software clock
fn apply_rate_defaults(cfg: &mut Map<String, Value>) {
    cfg.entry("numerator").or_insert(Value::from(DEFAULT_NUMERATOR));
    cfg.entry("denominator").or_insert(Value::from(DEFAULT_DENOMINATOR));
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create("clock:", |rt, id| {
        rt.set_predicate(id, |rt, id| {
            rt.object(id)
                .is_some_and(|obj| !obj.has_error() && !obj.refs().is_empty())
        });
    });

    rt.on_create(SOFTWARE_CLOCK, |rt, id| {
        if let Some(Value::Object(cfg)) = rt.object_mut(id).map(|obj| &mut obj.cfg) {
            apply_rate_defaults(cfg);
        }

        rt.activation(
            id,
            "native clock",
            Activation::new(
                |rt, id, _| {
                    rt.start_native(id, ResourceKind::Clock, None);
                },
                |rt, id| rt.stop_native(id),
            ),
        );
    });
}
