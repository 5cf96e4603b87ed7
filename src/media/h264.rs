//! H.264/AVC helpers
//!
//! The native encoder hands out NAL units with a 4-byte length prefix. The
//! containers want them in two other shapes:
//! ```text
//! Matroska:  AVCDecoderConfigurationRecord as codec private, NALs length-prefixed
//! MPEG-TS:   Annex-B, every NAL preceded by the start code 00 00 00 01
//! ```
//!
//! AVCDecoderConfigurationRecord:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{VideoUnit, NAL_PREFIX_LEN};
use crate::error::MuxError;

/// Most SPS an AVCDecoderConfigurationRecord can count (5 bits)
pub const MAX_SPS: usize = 31;

/// Most PPS an AVCDecoderConfigurationRecord can count (8 bits)
pub const MAX_PPS: usize = 255;

/// Annex-B start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL unit types the muxers look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// IDR slice (keyframe)
    Idr = 5,
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            _ => None,
        }
    }
}

/// AVC decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// profile_idc of the first SPS
    pub profile: u8,
    pub compatibility: u8,
    /// level_idc, ten times the level number
    pub level: u8,
    /// Always 4 for units from the native encoder
    pub nalu_length_size: u8,
    /// Parameter sets without their length prefix
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Collect the parameter sets of a video header unit
    ///
    /// Profile, compatibility and level are the three bytes following the
    /// NAL header of the first SPS.
    pub fn from_header_unit(unit: &VideoUnit) -> Result<Self, MuxError> {
        let sps: Vec<Bytes> = unit.nals_of(NaluType::Sps).map(|nal| nal.payload()).collect();
        let pps: Vec<Bytes> = unit.nals_of(NaluType::Pps).map(|nal| nal.payload()).collect();

        let first = sps.first().ok_or(MuxError::MissingSps)?;
        if pps.is_empty() {
            return Err(MuxError::MissingPps);
        }
        if first.len() < 4 {
            return Err(MuxError::SpsTooShort(first.len() + NAL_PREFIX_LEN));
        }
        if sps.len() > MAX_SPS || pps.len() > MAX_PPS {
            return Err(MuxError::TooManyParameterSets {
                sps: sps.len(),
                pps: pps.len(),
            });
        }
        if let Some(big) = sps.iter().chain(pps.iter()).find(|set| set.len() > u16::MAX as usize) {
            return Err(MuxError::ParameterSetTooLarge(big.len()));
        }

        Ok(AvcConfig {
            profile: first[1],
            compatibility: first[2],
            level: first[3],
            nalu_length_size: NAL_PREFIX_LEN as u8,
            sps,
            pps,
        })
    }

    /// Serialize as an AVCDecoderConfigurationRecord
    pub fn to_bytes(&self) -> Bytes {
        let sets: usize = self.sps.iter().chain(self.pps.iter()).map(|s| s.len() + 2).sum();
        let mut buf = BytesMut::with_capacity(7 + sets);

        buf.put_u8(1);
        buf.put_u8(self.profile);
        buf.put_u8(self.compatibility);
        buf.put_u8(self.level);
        buf.put_u8(0xFC | (self.nalu_length_size.saturating_sub(1) & 0x03));

        buf.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            buf.put_u16(sps.len() as u16);
            buf.put_slice(sps);
        }

        buf.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            buf.put_u16(pps.len() as u16);
            buf.put_slice(pps);
        }

        buf.freeze()
    }
}

/// Append the unit's NALs, each prefixed by its 4-byte big-endian length
pub fn write_length_prefixed(unit: &VideoUnit, out: &mut BytesMut) {
    for nal in &unit.nals {
        let payload = nal.payload();
        out.put_u32(payload.len() as u32);
        out.put_slice(&payload);
    }
}

/// Append the unit's NALs in Annex-B form
pub fn write_annex_b(unit: &VideoUnit, out: &mut BytesMut) {
    for nal in &unit.nals {
        out.put_slice(&START_CODE);
        out.put_slice(&nal.payload());
    }
}
