//! Live Matroska output
//!
//! The stream is an EBML header and a Segment of unknown size holding Info
//! and Tracks, followed by one Cluster per access unit:
//! ```text
//! EBML | Segment(unknown) [ Info | Tracks [ video #1 | audio #2 ] ]
//! Cluster [ Timecode | SimpleBlock ]
//! Cluster [ Timecode | SimpleBlock ]
//! ...
//! ```
//! Timecodes are nanoseconds (TimecodeScale = 1). Each SimpleBlock carries
//! a relative timecode of zero; the absolute time is on its Cluster.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::ebml::{ids, EbmlWriter};
use super::frame::ContainerMuxer;
use crate::error::MuxError;
use crate::media::aac::mixer_layout;
use crate::media::h264::write_length_prefixed;
use crate::media::{AudioUnit, AvcConfig, VideoUnit};

pub const VIDEO_TRACK: u8 = 1;
pub const AUDIO_TRACK: u8 = 2;

pub const VIDEO_CODEC_ID: &str = "V_MPEG4/ISO/AVC";
pub const AUDIO_CODEC_ID: &str = "A_AAC";

const APP_NAME: &str = "livecast";

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

const FLAG_KEYFRAME: u8 = 0x01;

/// Matroska muxer for one H.264 and one AAC track
#[derive(Debug, Clone)]
pub struct MatroskaMuxer {
    width: u32,
    height: u32,
}

impl Default for MatroskaMuxer {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl MatroskaMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised picture size
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn track_flags(w: &mut EbmlWriter, number: u8, kind: u64) {
        w.uint(ids::TRACK_NUMBER, u64::from(number))
            .uint(ids::TRACK_UID, u64::from(number))
            .uint(ids::TRACK_TYPE, kind)
            .uint(ids::FLAG_ENABLED, 1)
            .uint(ids::FLAG_DEFAULT, 1)
            .uint(ids::FLAG_FORCED, 1)
            .uint(ids::FLAG_LACING, 0)
            .uint(ids::MIN_CACHE, 0)
            .uint(ids::MAX_BLOCK_ADDITION_ID, 0);
    }

    /// One Cluster holding one SimpleBlock
    fn cluster(timecode: u64, track: u8, flags: u8, write_body: impl FnOnce(&mut BytesMut)) -> Bytes {
        let mut block = BytesMut::new();
        block.put_u8(0x80 | track);
        block.put_i16(0);
        block.put_u8(flags);
        write_body(&mut block);

        let mut w = EbmlWriter::new();
        w.master(ids::CLUSTER, |w| {
            w.uint(ids::TIMECODE, timecode);
            w.binary(ids::SIMPLE_BLOCK, &block);
        });
        w.freeze()
    }
}

impl ContainerMuxer for MatroskaMuxer {
    fn init_segment(
        &mut self,
        video: &Arc<VideoUnit>,
        audio: &Arc<AudioUnit>,
    ) -> Result<Bytes, MuxError> {
        let avc = AvcConfig::from_header_unit(video)?.to_bytes();
        let asc = mixer_layout(&audio.data);

        let mut w = EbmlWriter::new();
        w.master(ids::EBML, |w| {
            w.uint(ids::EBML_VERSION, 1)
                .uint(ids::EBML_READ_VERSION, 1)
                .uint(ids::EBML_MAX_ID_LENGTH, 4)
                .uint(ids::EBML_MAX_SIZE_LENGTH, 8)
                .string(ids::DOC_TYPE, "matroska")
                .uint(ids::DOC_TYPE_VERSION, 1)
                .uint(ids::DOC_TYPE_READ_VERSION, 1);
        });

        let (width, height) = (self.width, self.height);
        w.master_unknown(ids::SEGMENT, |w| {
            w.master(ids::INFO, |w| {
                w.uint(ids::TIMECODE_SCALE, 1)
                    .string(ids::MUXING_APP, APP_NAME)
                    .string(ids::WRITING_APP, APP_NAME);
            });
            w.master(ids::TRACKS, |w| {
                w.master(ids::TRACK_ENTRY, |w| {
                    Self::track_flags(w, VIDEO_TRACK, TRACK_TYPE_VIDEO);
                    w.string(ids::CODEC_ID, VIDEO_CODEC_ID)
                        .binary(ids::CODEC_PRIVATE, &avc)
                        .uint(ids::CODEC_DECODE_ALL, 1)
                        .uint(ids::SEEK_PRE_ROLL, 0)
                        .master(ids::VIDEO, |w| {
                            w.uint(ids::FLAG_INTERLACED, 0)
                                .uint(ids::PIXEL_WIDTH, u64::from(width))
                                .uint(ids::PIXEL_HEIGHT, u64::from(height));
                        });
                });
                w.master(ids::TRACK_ENTRY, |w| {
                    Self::track_flags(w, AUDIO_TRACK, TRACK_TYPE_AUDIO);
                    w.string(ids::CODEC_ID, AUDIO_CODEC_ID)
                        .binary(ids::CODEC_PRIVATE, &audio.data)
                        .uint(ids::CODEC_DECODE_ALL, 1)
                        .uint(ids::SEEK_PRE_ROLL, 0)
                        .master(ids::AUDIO, |w| {
                            w.float(ids::SAMPLING_FREQUENCY, asc.sampling_frequency as f32)
                                .uint(ids::CHANNELS, u64::from(asc.channels()));
                        });
                });
            });
        });

        Ok(w.freeze())
    }

    fn video_frame(&mut self, unit: &VideoUnit) -> Bytes {
        let flags = if unit.keyframe { FLAG_KEYFRAME } else { 0 };
        Self::cluster(unit.dts, VIDEO_TRACK, flags, |block| write_length_prefixed(unit, block))
    }

    fn audio_frame(&mut self, unit: &AudioUnit) -> Bytes {
        Self::cluster(unit.pts, AUDIO_TRACK, 0, |block| block.put_slice(&unit.data))
    }
}
