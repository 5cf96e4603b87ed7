//! Muxer output types

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::MuxError;
use crate::media::{AudioUnit, VideoUnit};
use crate::store::ObjectId;

/// Container format of a muxer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxFormat {
    Matroska,
    MpegTs,
}

impl MuxFormat {
    /// MIME type for an HTTP response carrying this container
    pub fn content_type(&self) -> &'static str {
        match self {
            MuxFormat::Matroska => "video/x-matroska",
            MuxFormat::MpegTs => "video/mp2t",
        }
    }
}

impl fmt::Display for MuxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxFormat::Matroska => f.write_str("matroska"),
            MuxFormat::MpegTs => f.write_str("mpegts"),
        }
    }
}

/// Identifies a shared muxer session: one per format and mixer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub format: MuxFormat,
    pub mixer: ObjectId,
}

impl SessionKey {
    pub fn new(format: MuxFormat, mixer: ObjectId) -> Self {
        Self { format, mixer }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mixer, self.format)
    }
}

/// A piece of container output
///
/// Cheap to clone: the bytes are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxChunk {
    pub data: Bytes,
    /// The chunk starts with a video keyframe, so a consumer may join here
    pub keyframe: bool,
}

impl MuxChunk {
    pub fn new(data: Bytes, keyframe: bool) -> Self {
        Self { data, keyframe }
    }
}

/// Serializes access units into one container format
pub trait ContainerMuxer {
    /// Take the header units and return the stream's init segment
    ///
    /// Fails on header units that violate the codec contract. The init
    /// segment may be empty for formats that repeat their tables in-band.
    fn init_segment(
        &mut self,
        video: &Arc<VideoUnit>,
        audio: &Arc<AudioUnit>,
    ) -> Result<Bytes, MuxError>;

    fn video_frame(&mut self, unit: &VideoUnit) -> Bytes;

    fn audio_frame(&mut self, unit: &AudioUnit) -> Bytes;
}
