//! Access units handed out by the native mixing engines
//!
//! Timestamps are nanoseconds on the mixer clock. Video units carry their
//! NAL units with a 4-byte big-endian length in front of each one:
//! ```text
//! +----------------+-----------------------+----------------+-----
//! | length (4, BE) | NAL header | payload  | length (4, BE) | ...
//! +----------------+-----------------------+----------------+-----
//! ```

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::h264::NaluType;

/// Length of the prefix in front of every NAL unit
pub const NAL_PREFIX_LEN: usize = 4;

/// One NAL unit of a video access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nal {
    /// NAL unit type (lower 5 bits of the NAL header)
    pub nal_type: u8,
    /// NAL bytes including the 4-byte length prefix
    pub data: Bytes,
}

impl Nal {
    pub fn new(nal_type: u8, data: Bytes) -> Self {
        Self { nal_type, data }
    }

    /// Build a prefixed NAL from its raw bytes, starting at the NAL header
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(NAL_PREFIX_LEN + payload.len());
        data.put_u32(payload.len() as u32);
        data.put_slice(payload);

        Self {
            nal_type: payload.first().map(|b| b & 0x1F).unwrap_or(0),
            data: data.freeze(),
        }
    }

    /// NAL bytes without the length prefix
    pub fn payload(&self) -> Bytes {
        if self.data.len() < NAL_PREFIX_LEN {
            return Bytes::new();
        }
        self.data.slice(NAL_PREFIX_LEN..)
    }

    pub fn kind(&self) -> Option<NaluType> {
        NaluType::from_byte(self.nal_type)
    }
}

/// Encoded video frame, or the parameter-set unit that precedes a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUnit {
    /// Decode timestamp (ns)
    pub dts: u64,
    /// Presentation timestamp (ns)
    pub pts: u64,
    pub keyframe: bool,
    pub nals: Vec<Nal>,
}

impl VideoUnit {
    pub fn new(dts: u64, pts: u64, keyframe: bool, nals: Vec<Nal>) -> Self {
        Self {
            dts,
            pts,
            keyframe,
            nals,
        }
    }

    /// NAL units of one type, in order
    pub fn nals_of(&self, kind: NaluType) -> impl Iterator<Item = &Nal> {
        self.nals.iter().filter(move |nal| nal.kind() == Some(kind))
    }

    /// Total size of all NAL bytes, prefixes included
    pub fn byte_len(&self) -> usize {
        self.nals.iter().map(|nal| nal.data.len()).sum()
    }
}

/// Encoded audio frame, or the codec header unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUnit {
    /// Presentation timestamp (ns)
    pub pts: u64,
    pub data: Bytes,
}

impl AudioUnit {
    pub fn new(pts: u64, data: Bytes) -> Self {
        Self { pts, data }
    }
}

/// Either kind of access unit, as delivered by a native resource
///
/// Cheap to clone: the unit itself is shared.
#[derive(Debug, Clone)]
pub enum AccessUnit {
    Video(Arc<VideoUnit>),
    Audio(Arc<AudioUnit>),
}

impl AccessUnit {
    pub fn video(unit: VideoUnit) -> Self {
        AccessUnit::Video(Arc::new(unit))
    }

    pub fn audio(unit: AudioUnit) -> Self {
        AccessUnit::Audio(Arc::new(unit))
    }

    pub fn pts(&self) -> u64 {
        match self {
            AccessUnit::Video(unit) => unit.pts,
            AccessUnit::Audio(unit) => unit.pts,
        }
    }
}
