//! Live MPEG transport stream output
//!
//! Every access unit becomes one PES packet split over 188-byte transport
//! packets. A video keyframe is preceded by the PAT, the PMT and the video
//! parameter sets, so a receiver can join at any keyframe:
//! ```text
//! keyframe:  PAT | PMT | PES(SPS/PPS) | PES(IDR)
//! frame:     PES(slice)
//! audio:     PES(ADTS + AAC)            (PCR on the first packet, every 25 ms)
//! ```
//! The program tables never change, so their CRCs are constants.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::ContainerMuxer;
use crate::error::MuxError;
use crate::media::aac::mixer_layout;
use crate::media::h264::write_annex_b;
use crate::media::{adts_header, AudioSpecificConfig, AudioUnit, AvcConfig, VideoUnit};

pub const PACKET_LEN: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

pub const PAT_PID: u16 = 0x00;
pub const PMT_PID: u16 = 0x21;
pub const AUDIO_PID: u16 = 0x22;
pub const VIDEO_PID: u16 = 0x23;

pub const VIDEO_STREAM_ID: u8 = 0xE0;
pub const AUDIO_STREAM_ID: u8 = 0xC0;

const PACKET_HEADER_LEN: usize = 4;
const PACKET_PAYLOAD_LEN: usize = PACKET_LEN - PACKET_HEADER_LEN;
const PES_HEADER_LEN: usize = 14;
/// Adaptation field length byte, flags byte and the 6 PCR bytes
const PCR_FIELD_LEN: usize = 8;

/// Pointer field and PAT section: program 0x21 at PID 0x21
const PAT_SECTION: [u8; 17] = [
    0x00, 0x00, 0xB0, 0x0D, 0x00, 0x00, 0xC1, 0x00, 0x00, 0x00, 0x21, 0xE0, 0x21, 0xC6, 0xB6,
    0x78, 0xDC,
];

/// Pointer field and PMT section: PCR on 0x22, AAC on 0x22, H.264 on 0x23
const PMT_SECTION: [u8; 27] = [
    0x00, 0x02, 0xB0, 0x17, 0x00, 0x21, 0xC1, 0x00, 0x00, 0xE0, 0x22, 0xF0, 0x00, 0x0F, 0xE0,
    0x22, 0xF0, 0x00, 0x1B, 0xE0, 0x23, 0xF0, 0x00, 0xCD, 0x99, 0x80, 0x0B,
];

/// Nanoseconds to the 33-bit 90 kHz clock
pub fn to_90khz(ns: u64) -> u64 {
    ((u128::from(ns) * 90_000 / 1_000_000_000) as u64) & 0x1_FFFF_FFFF
}

/// PES timestamp field with the `0010` prefix and marker bits
pub fn pts_bytes(pts: u64) -> [u8; 5] {
    [
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        (((pts >> 14) & 0xFE) | 0x01) as u8,
        (pts >> 7) as u8,
        (((pts << 1) & 0xFE) | 0x01) as u8,
    ]
}

/// 33-bit base, 6 reserved bits and 9-bit extension of a PCR at `ns`
pub fn pcr_bytes(ns: u64) -> [u8; 6] {
    let base = to_90khz(ns);
    let ext = ((u128::from(ns) * 27_000_000 / 1_000_000_000) % 300) as u16;
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        (((base & 1) << 7) as u8) | 0x7E | ((ext >> 8) & 0x01) as u8,
        ext as u8,
    ]
}

/// MPEG-TS muxer for one H.264 and one AAC stream
#[derive(Debug)]
pub struct MpegTsMuxer {
    pcr_interval: Duration,
    last_pcr: Option<u64>,
    continuity: HashMap<u16, u8>,
    video_header: Option<Arc<VideoUnit>>,
    audio_config: AudioSpecificConfig,
}

impl MpegTsMuxer {
    pub fn new(pcr_interval: Duration) -> Self {
        Self {
            pcr_interval,
            last_pcr: None,
            continuity: HashMap::new(),
            video_header: None,
            audio_config: AudioSpecificConfig::LC_44100_STEREO,
        }
    }

    /// Continuity counter for the next packet on `pid`
    fn next_cc(&mut self, pid: u16) -> u8 {
        let counter = self.continuity.entry(pid).or_insert(0);
        let cc = *counter;
        *counter = (cc + 1) & 0x0F;
        cc
    }

    fn packet_header(&mut self, out: &mut BytesMut, pid: u16, start: bool, adaptation: bool) {
        let cc = self.next_cc(pid);
        out.put_u8(SYNC_BYTE);
        let start_bit = if start { 0x40 } else { 0x00 };
        let adaptation_bit = if adaptation { 0x20 } else { 0x00 };
        out.put_u8(start_bit | ((pid >> 8) & 0x1F) as u8);
        out.put_u8(pid as u8);
        out.put_u8(0x10 | adaptation_bit | cc);
    }

    fn table(&mut self, out: &mut BytesMut, pid: u16, section: &[u8]) {
        self.packet_header(out, pid, true, false);
        out.put_slice(section);
        out.put_bytes(0xFF, PACKET_PAYLOAD_LEN - section.len());
    }

    fn tables(&mut self, out: &mut BytesMut) {
        self.table(out, PAT_PID, &PAT_SECTION);
        self.table(out, PMT_PID, &PMT_SECTION);
    }

    /// Split one PES packet over as many transport packets as needed
    ///
    /// The last packet is filled up with adaptation field stuffing.
    fn pes(&mut self, out: &mut BytesMut, pid: u16, stream_id: u8, pts_ns: u64, pcr_ns: Option<u64>, payload: &[u8]) {
        let pes_len = payload.len() + 8;
        let mut header = BytesMut::with_capacity(PES_HEADER_LEN);
        header.put_slice(&[0x00, 0x00, 0x01, stream_id]);
        header.put_u16(if pes_len > 0xFFFF { 0 } else { pes_len as u16 });
        header.put_slice(&[0x80, 0x80, 0x05]);
        header.put_slice(&pts_bytes(to_90khz(pts_ns)));

        let mut rest = payload;
        let mut pcr = pcr_ns;
        let mut first = true;
        loop {
            let mut room = PACKET_PAYLOAD_LEN;
            if first {
                room -= PES_HEADER_LEN;
            }
            if pcr.is_some() {
                room -= PCR_FIELD_LEN;
            }
            let take = rest.len().min(room);
            let stuffing = room - take;

            self.packet_header(out, pid, first, pcr.is_some() || stuffing > 0);
            match pcr.take() {
                Some(ns) => {
                    out.put_u8((7 + stuffing) as u8);
                    out.put_u8(0x10);
                    out.put_slice(&pcr_bytes(ns));
                    out.put_bytes(0xFF, stuffing);
                }
                None if stuffing == 1 => out.put_u8(0),
                None if stuffing > 1 => {
                    out.put_u8((stuffing - 1) as u8);
                    out.put_u8(0x00);
                    out.put_bytes(0xFF, stuffing - 2);
                }
                None => {}
            }

            if first {
                out.put_slice(&header);
                first = false;
            }
            out.put_slice(&rest[..take]);
            rest = &rest[take..];

            if rest.is_empty() {
                break;
            }
        }
    }

    fn pcr_due(&mut self, pts: u64) -> Option<u64> {
        let interval = self.pcr_interval.as_nanos() as u64;
        match self.last_pcr {
            Some(last) if pts.saturating_sub(last) <= interval => None,
            _ => {
                self.last_pcr = Some(pts);
                Some(pts)
            }
        }
    }
}

impl ContainerMuxer for MpegTsMuxer {
    fn init_segment(
        &mut self,
        video: &Arc<VideoUnit>,
        audio: &Arc<AudioUnit>,
    ) -> Result<Bytes, MuxError> {
        AvcConfig::from_header_unit(video)?;
        self.audio_config = mixer_layout(&audio.data);
        self.video_header = Some(Arc::clone(video));

        // Tables and parameter sets travel in-band with each keyframe
        Ok(Bytes::new())
    }

    fn video_frame(&mut self, unit: &VideoUnit) -> Bytes {
        let mut out = BytesMut::new();

        if unit.keyframe {
            self.tables(&mut out);
            if let Some(header) = self.video_header.clone() {
                let mut es = BytesMut::new();
                write_annex_b(&header, &mut es);
                self.pes(&mut out, VIDEO_PID, VIDEO_STREAM_ID, unit.pts, None, &es);
            }
        }

        let mut es = BytesMut::with_capacity(unit.byte_len());
        write_annex_b(unit, &mut es);
        self.pes(&mut out, VIDEO_PID, VIDEO_STREAM_ID, unit.pts, None, &es);

        out.freeze()
    }

    fn audio_frame(&mut self, unit: &AudioUnit) -> Bytes {
        let mut es = BytesMut::with_capacity(7 + unit.data.len());
        es.put_slice(&adts_header(&self.audio_config, unit.data.len()));
        es.put_slice(&unit.data);

        let pcr = self.pcr_due(unit.pts);
        let mut out = BytesMut::new();
        self.pes(&mut out, AUDIO_PID, AUDIO_STREAM_ID, unit.pts, pcr, &es);
        out.freeze()
    }
}
