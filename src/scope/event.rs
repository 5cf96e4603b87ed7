//! Events delivered through the scope tree

use std::sync::Arc;

use crate::media::{AccessUnit, AudioUnit, VideoUnit};

/// Event kinds, used to key listener registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostDigest,
    Destroy,
    Headers,
    Frame,
    VideoHeaders,
    VideoFrame,
    AudioHeaders,
    AudioFrame,
    SourcesChanged,
    HooksChanged,
}

/// An event and its payload
#[derive(Debug, Clone)]
pub enum Event {
    /// A digest cycle settled. Emitted on the root scope.
    PostDigest,
    /// The scope is about to be torn down
    Destroy,
    /// A native resource produced a header unit
    Headers(AccessUnit),
    /// A native resource produced a frame
    Frame(AccessUnit),
    VideoHeaders(Arc<VideoUnit>),
    VideoFrame(Arc<VideoUnit>),
    AudioHeaders(Arc<AudioUnit>),
    AudioFrame(Arc<AudioUnit>),
    /// A mixer's source list was replaced
    SourcesChanged,
    /// A video mixer's hook list was replaced
    HooksChanged,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PostDigest => EventKind::PostDigest,
            Event::Destroy => EventKind::Destroy,
            Event::Headers(_) => EventKind::Headers,
            Event::Frame(_) => EventKind::Frame,
            Event::VideoHeaders(_) => EventKind::VideoHeaders,
            Event::VideoFrame(_) => EventKind::VideoFrame,
            Event::AudioHeaders(_) => EventKind::AudioHeaders,
            Event::AudioFrame(_) => EventKind::AudioFrame,
            Event::SourcesChanged => EventKind::SourcesChanged,
            Event::HooksChanged => EventKind::HooksChanged,
        }
    }
}
