//! `root:` objects
//!
//! Roots are sticky singletons whose id equals their type. They hold the
//! references that keep configured scenes, mixers and streams alive.

use serde_json::{json, Value};

use crate::runtime::Runtime;

/// Id and type of the broadcasting core's own root
pub const ROOT_ID: &str = "root:livecast";

/// Configuration of a fresh `root:livecast`
pub fn default_root_cfg() -> Value {
    json!({
        "type": ROOT_ID,
        "sceneIds": [],
        "mixerIds": [],
        "streamIds": [],
    })
}

pub(super) fn install(rt: &mut Runtime) {
    rt.on_create("root:", |rt, id| {
        if let Some(obj) = rt.object_mut(id) {
            obj.sticky = true;
        }
    });

    rt.on_create(ROOT_ID, |rt, id| {
        rt.resolve_all(id, "scenes");
        rt.resolve_all(id, "mixers");
        rt.resolve_all(id, "streams");
    });
}
