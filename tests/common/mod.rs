//! Shared helpers for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use livecast::media::{AccessUnit, AudioUnit, Nal, VideoUnit};
use livecast::{
    model, EventSender, HookId, InstanceId, NativeBackend, NativeError, NativeEvent,
    NativeHandle, ObjectId, ResourceKind, ResourceRequest, Runtime, RuntimeConfig, SourceSlot,
};
use serde_json::{json, Value};

/// Install a test subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A call the fake engine received
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(ResourceKind, ObjectId),
    Sources(ObjectId, Vec<SourceSlot>),
    Hooks(ObjectId, Vec<HookId>),
    Destroy(ResourceKind, ObjectId),
}

#[derive(Default)]
pub struct Engine {
    pub calls: Vec<Call>,
    pub senders: HashMap<ObjectId, EventSender>,
    pub refuse: Vec<ResourceKind>,
    next_instance: u64,
}

impl Engine {
    /// Resources of `kind` currently running
    pub fn running(&self, kind: ResourceKind) -> Vec<ObjectId> {
        let mut running: Vec<ObjectId> = Vec::new();
        for call in &self.calls {
            match call {
                Call::Start(k, owner) if *k == kind => running.push(owner.clone()),
                Call::Destroy(k, owner) if *k == kind => {
                    if let Some(pos) = running.iter().position(|id| id == owner) {
                        running.remove(pos);
                    }
                }
                _ => {}
            }
        }
        running
    }

    pub fn starts(&self, kind: ResourceKind) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Start(k, _) if *k == kind))
            .count()
    }

    /// Last source list pushed to `owner`
    pub fn sources_of(&self, owner: &ObjectId) -> Option<Vec<SourceSlot>> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Sources(id, slots) if id == owner => Some(slots.clone()),
            _ => None,
        })
    }

    pub fn hooks_of(&self, owner: &ObjectId) -> Option<Vec<HookId>> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Hooks(id, hooks) if id == owner => Some(hooks.clone()),
            _ => None,
        })
    }

    pub fn sender(&self, owner: &ObjectId) -> EventSender {
        self.senders
            .get(owner)
            .cloned()
            .unwrap_or_else(|| panic!("no native resource for {owner}"))
    }
}

/// Fake native engine that records every call
#[derive(Clone, Default)]
pub struct FakeBackend(pub Rc<RefCell<Engine>>);

struct FakeHandle {
    kind: ResourceKind,
    owner: ObjectId,
    instance: InstanceId,
    engine: Rc<RefCell<Engine>>,
}

impl NativeHandle for FakeHandle {
    fn instance_id(&self) -> InstanceId {
        self.instance
    }

    fn set_sources(&mut self, sources: &[SourceSlot]) {
        self.engine
            .borrow_mut()
            .calls
            .push(Call::Sources(self.owner.clone(), sources.to_vec()));
    }

    fn set_hooks(&mut self, hooks: &[HookId]) {
        self.engine
            .borrow_mut()
            .calls
            .push(Call::Hooks(self.owner.clone(), hooks.to_vec()));
    }

    fn destroy(self: Box<Self>) {
        let mut engine = self.engine.borrow_mut();
        engine.senders.remove(&self.owner);
        engine.calls.push(Call::Destroy(self.kind, self.owner.clone()));
    }
}

impl NativeBackend for FakeBackend {
    fn start(
        &self,
        request: ResourceRequest<'_>,
        events: EventSender,
    ) -> Result<Box<dyn NativeHandle>, NativeError> {
        let mut engine = self.0.borrow_mut();
        if engine.refuse.contains(&request.kind) {
            return Err(NativeError::StartFailed {
                kind: request.kind.to_string(),
                message: "refused".into(),
            });
        }

        engine.next_instance += 1;
        let instance = InstanceId(engine.next_instance);
        engine.calls.push(Call::Start(request.kind, request.owner.clone()));
        engine.senders.insert(request.owner.clone(), events);

        Ok(Box::new(FakeHandle {
            kind: request.kind,
            owner: request.owner.clone(),
            instance,
            engine: Rc::clone(&self.0),
        }))
    }
}

/// Runtime with the built-in object types and a fake engine
pub fn runtime() -> (Runtime, Rc<RefCell<Engine>>) {
    runtime_with(RuntimeConfig::default())
}

pub fn runtime_with(config: RuntimeConfig) -> (Runtime, Rc<RefCell<Engine>>) {
    init_tracing();
    let backend = FakeBackend::default();
    let engine = Rc::clone(&backend.0);
    let mut rt = Runtime::new(Rc::new(backend), config);
    model::install(&mut rt);
    (rt, engine)
}

pub const CAMERA: &str = "source:video:camera";
pub const MIC: &str = "source:audio:mic";
pub const SCENE: &str = "scene:main";
pub const MIXER: &str = "mixer:program";

/// Root, one camera, one microphone, a scene with both and a mixer on it
pub fn studio(rt: &mut Runtime) {
    let objects: [(&str, Value); 5] = [
        (CAMERA, json!({"type": "source:video:camera"})),
        (MIC, json!({"type": "source:audio:mic"})),
        (
            SCENE,
            json!({
                "type": "scene",
                "video": [{"sourceId": CAMERA, "x1": 0, "y1": 0, "x2": 1, "y2": 1,
                           "u1": 0, "v1": 0, "u2": 1, "v2": 1}],
                "audio": [{"sourceId": MIC, "volume": 1}],
            }),
        ),
        (MIXER, json!({"type": "mixer", "sceneId": SCENE})),
        (
            model::ROOT_ID,
            json!({"type": model::ROOT_ID, "sceneIds": [SCENE], "mixerIds": [MIXER]}),
        ),
    ];
    for (id, cfg) in objects {
        rt.create(cfg, Some(ObjectId::new(id))).unwrap();
    }
    rt.settle();
}

pub fn id(s: &str) -> ObjectId {
    ObjectId::new(s)
}

pub fn video_headers() -> AccessUnit {
    AccessUnit::video(VideoUnit::new(
        0,
        0,
        true,
        vec![
            Nal::from_payload(&[0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9]),
            Nal::from_payload(&[0x68, 0xEB, 0xE3, 0xCB]),
        ],
    ))
}

pub fn audio_headers() -> AccessUnit {
    AccessUnit::audio(AudioUnit::new(0, Bytes::from_static(&[0x12, 0x10])))
}

pub fn video_frame(pts: u64, keyframe: bool) -> AccessUnit {
    let nal_type = if keyframe { 0x65 } else { 0x41 };
    AccessUnit::video(VideoUnit::new(
        pts,
        pts,
        keyframe,
        vec![Nal::from_payload(&[nal_type, 0x88, 0x80, 0x10])],
    ))
}

pub fn audio_frame(pts: u64) -> AccessUnit {
    AccessUnit::audio(AudioUnit::new(pts, Bytes::from_static(&[0x21, 0x10, 0x04])))
}

/// Send a header unit and frames from a native engine, then dispatch them
pub fn feed(rt: &mut Runtime, sender: &EventSender, events: Vec<NativeEvent>) {
    for event in events {
        assert!(sender.send(event));
    }
    rt.process_native_events();
    rt.settle();
}

pub fn unwrap_video(unit: &AccessUnit) -> Arc<VideoUnit> {
    match unit {
        AccessUnit::Video(unit) => Arc::clone(unit),
        AccessUnit::Audio(_) => panic!("expected a video unit"),
    }
}
