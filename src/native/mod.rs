//! Native resource interface
//!
//! The mixing and encoding engines are opaque. The runtime asks a
//! [`NativeBackend`] to start a resource for an object and gets back a
//! [`NativeHandle`] it reconfigures and eventually destroys. Everything the
//! engine reports travels back through an [`EventSender`], which is the one
//! piece of this crate that may cross threads.

mod bridge;

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::NativeError;
use crate::media::AccessUnit;
use crate::store::ObjectId;

/// Kind of native resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Source,
    VideoMixer,
    AudioMixer,
    Clock,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Source => "source",
            ResourceKind::VideoMixer => "video mixer",
            ResourceKind::AudioMixer => "audio mixer",
            ResourceKind::Clock => "clock",
        };
        f.write_str(name)
    }
}

/// Identifies a running native instance, as assigned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// Opaque video hook registered by a frame listener (preview, recording)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u64);

/// Placement of a source within a mixer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotLayout {
    /// Destination rectangle and texture coordinates, all normalized
    Video {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        u1: f64,
        v1: f64,
        u2: f64,
        v2: f64,
    },
    Audio {
        volume: f64,
    },
}

/// One entry of a mixer's source list
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSlot {
    pub source: ObjectId,
    /// Native instance of the source, once it runs
    pub instance: Option<InstanceId>,
    pub layout: SlotLayout,
}

/// What the runtime asks a backend to start
#[derive(Debug, Clone, Copy)]
pub struct ResourceRequest<'a> {
    pub owner: &'a ObjectId,
    pub kind: ResourceKind,
    /// The owning object's configuration, including its `type`
    pub cfg: &'a Value,
    /// Clock instance driving a video mixer
    pub clock: Option<InstanceId>,
}

/// Starts native resources
pub trait NativeBackend {
    fn start(
        &self,
        request: ResourceRequest<'_>,
        events: EventSender,
    ) -> Result<Box<dyn NativeHandle>, NativeError>;
}

/// A running native resource
pub trait NativeHandle {
    fn instance_id(&self) -> InstanceId;

    /// Replace the mixer's source list
    fn set_sources(&mut self, _sources: &[SourceSlot]) {}

    /// Replace the video mixer's hook list
    fn set_hooks(&mut self, _hooks: &[HookId]) {}

    /// Stop the resource. No events are expected afterwards, but late ones
    /// are tolerated.
    fn destroy(self: Box<Self>);
}

/// Log level of a native log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Something a native resource reports
#[derive(Debug, Clone)]
pub enum NativeEvent {
    /// Header or parameter-set unit; supersedes earlier headers
    Headers(AccessUnit),
    Frame(AccessUnit),
    /// The resource failed and stopped producing
    Failure(String),
    /// The engine skipped `n` frames
    Stalled(u32),
    Log(LogLevel, String),
}

/// Runtime-assigned number of one native start
///
/// Every successful start of a resource gets a fresh generation, so events
/// from an instance that was already destroyed can be told apart from
/// those of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

/// A native event tagged with its owning object and the start it came from
#[derive(Debug, Clone)]
pub struct NativeMessage {
    pub owner: ObjectId,
    /// `None` for senders not bound to a native start
    pub generation: Option<Generation>,
    pub event: NativeEvent,
}

/// Thread-safe sending end of the hand-off queue, bound to one object
#[derive(Debug, Clone)]
pub struct EventSender {
    owner: ObjectId,
    generation: Option<Generation>,
    tx: mpsc::UnboundedSender<NativeMessage>,
}

impl EventSender {
    pub(crate) fn new(
        owner: ObjectId,
        generation: Option<Generation>,
        tx: mpsc::UnboundedSender<NativeMessage>,
    ) -> Self {
        Self {
            owner,
            generation,
            tx,
        }
    }

    pub fn owner(&self) -> &ObjectId {
        &self.owner
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Queue an event. Returns false once the runtime is gone.
    pub fn send(&self, event: NativeEvent) -> bool {
        self.tx
            .send(NativeMessage {
                owner: self.owner.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
