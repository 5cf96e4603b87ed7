//! Live state projection
//!
//! A JSON view of every persistent object, kept current after each digest
//! cycle and streamed to observers (a control UI, a status endpoint) as a
//! full snapshot followed by patches:
//!
//! ```text
//! subscribe() ──► Reset { "<id>": { cfg, refs, hasError, sticky, activations }, ... }
//! PostDigest  ──► Patch { "<id>": <new object view> | null }
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

use crate::runtime::{Disposer, Runtime};
use crate::scope::EventKind;
use crate::store::ManagedObject;

/// One message of the live state feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FeedMessage {
    /// The complete state
    Reset(Value),
    /// Objects that changed; `null` marks a removed object
    Patch(Map<String, Value>),
}

/// View of one object
fn object_view(obj: &ManagedObject) -> Value {
    let refs: Map<String, Value> = obj
        .refs()
        .iter()
        .map(|(from, count)| (from.to_string(), Value::from(*count)))
        .collect();
    let activations: Map<String, Value> = obj
        .activations()
        .iter()
        .map(|(name, started)| {
            let started = started
                .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
                .map(|since| Value::from(since.as_millis() as u64))
                .unwrap_or(Value::Null);
            (name.clone(), started)
        })
        .collect();

    json!({
        "cfg": obj.cfg,
        "refs": refs,
        "hasError": obj.has_error(),
        "sticky": obj.sticky,
        "activations": activations,
    })
}

/// Views of every non-ephemeral object, keyed by id
pub fn snapshot(rt: &Runtime) -> Map<String, Value> {
    rt.objects()
        .iter()
        .filter(|obj| !obj.ephemeral)
        .map(|obj| (obj.id().to_string(), object_view(obj)))
        .collect()
}

/// Entries of `next` that differ from `prev`, plus `null` for removed ids
pub fn diff(prev: &Map<String, Value>, next: &Map<String, Value>) -> Map<String, Value> {
    let mut patch: Map<String, Value> = next
        .iter()
        .filter(|(id, view)| prev.get(id.as_str()) != Some(view))
        .map(|(id, view)| (id.clone(), view.clone()))
        .collect();
    for id in prev.keys() {
        if !next.contains_key(id) {
            patch.insert(id.clone(), Value::Null);
        }
    }
    patch
}

struct FeedState {
    last: Map<String, Value>,
    tx: broadcast::Sender<FeedMessage>,
    patches: u64,
}

impl FeedState {
    fn update(&mut self, rt: &Runtime) {
        let next = snapshot(rt);
        let patch = diff(&self.last, &next);
        if patch.is_empty() {
            return;
        }
        self.last = next;
        self.patches += 1;
        tracing::trace!(changed = patch.len(), "State patch");
        // Nobody listening is fine
        let _ = self.tx.send(FeedMessage::Patch(patch));
    }
}

/// Publishes the live state after every completed digest cycle
pub struct ProjectionFeed {
    state: Rc<RefCell<FeedState>>,
    listener: Disposer,
}

impl ProjectionFeed {
    /// Start projecting `rt`
    pub fn install(rt: &mut Runtime) -> Self {
        let (tx, _) = broadcast::channel(rt.config().feed_channel_capacity);
        let state = Rc::new(RefCell::new(FeedState {
            last: snapshot(rt),
            tx,
            patches: 0,
        }));

        let feed_state = Rc::clone(&state);
        let root = rt.root_scope();
        let listener = rt.on(root, EventKind::PostDigest, move |rt, _| {
            feed_state.borrow_mut().update(rt);
        });

        tracing::debug!(objects = state.borrow().last.len(), "Projection feed installed");
        Self { state, listener }
    }

    /// The current state and a receiver for the patches that follow it
    pub fn subscribe(&self) -> (FeedMessage, broadcast::Receiver<FeedMessage>) {
        let state = self.state.borrow();
        let reset = FeedMessage::Reset(Value::Object(state.last.clone()));
        (reset, state.tx.subscribe())
    }

    /// Patches published so far
    pub fn patches(&self) -> u64 {
        self.state.borrow().patches
    }

    /// Stop projecting; open receivers see the channel close
    pub fn close(self, rt: &mut Runtime) {
        self.listener.dispose(rt);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::model::{self, ROOT_ID, SCENE};
    use crate::native::testing::NullBackend;
    use crate::store::ObjectId;

    fn runtime() -> Runtime {
        let mut rt = Runtime::new(Rc::new(NullBackend), RuntimeConfig::default());
        model::install(&mut rt);
        rt
    }

    #[test]
    fn test_diff() {
        let prev = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        let next = json!({"b": 3, "c": 4}).as_object().cloned().unwrap();

        let patch = diff(&prev, &next);
        assert_eq!(Value::Object(patch), json!({"a": null, "b": 3, "c": 4}));
        assert!(diff(&next, &next).is_empty());
    }

    #[test]
    fn test_reset_then_patches() {
        let mut rt = runtime();
        let feed = ProjectionFeed::install(&mut rt);

        let (reset, _) = feed.subscribe();
        assert_eq!(reset, FeedMessage::Reset(json!({})));

        let scene = ObjectId::new("scene:main");
        rt.create(json!({"type": SCENE}), Some(scene.clone())).unwrap();
        let root = rt
            .create(
                json!({"type": ROOT_ID, "sceneIds": ["scene:main"], "mixerIds": []}),
                Some(ObjectId::new(ROOT_ID)),
            )
            .unwrap();
        let (_, mut rx) = feed.subscribe();
        rt.settle();

        let mut state = Map::new();
        while let Ok(FeedMessage::Patch(patch)) = rx.try_recv() {
            state.extend(patch);
        }
        assert_eq!(state[ROOT_ID]["sticky"], true);
        assert_eq!(state["scene:main"]["refs"][ROOT_ID], 1);
        assert_eq!(state["scene:main"]["hasError"], false);

        // Dropping the reference lets the scene be collected
        rt.object_mut(&root).unwrap().cfg["sceneIds"] = json!([]);
        rt.mark();
        rt.settle();

        let mut removed = false;
        while let Ok(FeedMessage::Patch(patch)) = rx.try_recv() {
            if patch.get("scene:main") == Some(&Value::Null) {
                removed = true;
            }
        }
        assert!(removed);
        assert!(feed.patches() >= 2);

        let (FeedMessage::Reset(Value::Object(full)), _) = feed.subscribe() else {
            panic!("expected a reset");
        };
        assert!(full.contains_key(ROOT_ID));
        assert!(!full.contains_key("scene:main"));
    }

    #[test]
    fn test_ephemeral_objects_hidden() {
        let mut rt = runtime();
        let root = rt
            .create(model::default_root_cfg(), Some(ObjectId::new(ROOT_ID)))
            .unwrap();
        rt.object_mut(&root).unwrap().ephemeral = true;
        rt.settle();

        assert!(snapshot(&rt).is_empty());
    }

    #[test]
    fn test_feed_message_json() {
        let patch = FeedMessage::Patch(json!({"x": null}).as_object().cloned().unwrap());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"type": "patch", "data": {"x": null}})
        );
    }

    #[test]
    fn test_close_ends_stream() {
        let mut rt = runtime();
        let feed = ProjectionFeed::install(&mut rt);
        let (_, mut rx) = feed.subscribe();

        feed.close(&mut rt);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }
}
