//! EBML element encoding
//!
//! Every element is an id, a size and a body:
//! ```text
//! +-----------------+------------------+----------------+
//! | ID (1-4 bytes)  | size (vint, 1-8) | body (size)    |
//! +-----------------+------------------+----------------+
//! ```
//! IDs are written big-endian in as few bytes as their value needs (their
//! own length marker is part of the value). Sizes are variable-length
//! integers: the count of leading zero bits in the first byte, plus one, is
//! the total length, and the bits after the marker hold the value.

use bytes::{BufMut, Bytes, BytesMut};

/// Element ids used by the Matroska muxer
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_ENABLED: u32 = 0xB9;
    pub const FLAG_DEFAULT: u32 = 0x88;
    pub const FLAG_FORCED: u32 = 0x55AA;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const MIN_CACHE: u32 = 0x6DE7;
    pub const MAX_BLOCK_ADDITION_ID: u32 = 0x55EE;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const CODEC_DECODE_ALL: u32 = 0xAA;
    pub const SEEK_PRE_ROLL: u32 = 0x56BB;

    pub const VIDEO: u32 = 0xE0;
    pub const FLAG_INTERLACED: u32 = 0x9A;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;

    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
}

/// Size field of an element whose end is not known up front
pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Largest value a size vint can carry
pub const MAX_VINT: u64 = (1 << 56) - 2;

/// Bytes needed to write `id`
pub fn id_len(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

pub fn write_id(out: &mut BytesMut, id: u32) {
    out.put_uint(u64::from(id), id_len(id));
}

/// Bytes needed to write `value` as a size
///
/// The all-ones value of each width is reserved for "unknown".
pub fn vint_len(value: u64) -> usize {
    (1..8).find(|&n| value < (1u64 << (7 * n)) - 1).unwrap_or(8)
}

/// Write `value` as a size vint in the shortest width
pub fn write_vint(out: &mut BytesMut, value: u64) {
    let len = vint_len(value);
    let marker = 1u64 << (7 * len);
    out.put_uint(value.min(MAX_VINT) | marker, len);
}

/// Byte width of an unsigned integer element body
fn uint_len(value: u64) -> usize {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    }
}

/// Builds a sequence of EBML elements
#[derive(Debug, Default)]
pub struct EbmlWriter {
    buf: BytesMut,
}

impl EbmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(&mut self, id: u32, size: usize) {
        write_id(&mut self.buf, id);
        write_vint(&mut self.buf, size as u64);
    }

    /// Master element whose children `build` writes
    pub fn master(&mut self, id: u32, build: impl FnOnce(&mut EbmlWriter)) -> &mut Self {
        let mut body = EbmlWriter::new();
        build(&mut body);
        self.header(id, body.buf.len());
        self.buf.extend_from_slice(&body.buf);
        self
    }

    /// Master element of unknown size; everything that follows in the
    /// stream belongs to it
    pub fn master_unknown(&mut self, id: u32, build: impl FnOnce(&mut EbmlWriter)) -> &mut Self {
        write_id(&mut self.buf, id);
        self.buf.put_slice(&UNKNOWN_SIZE);
        build(self);
        self
    }

    pub fn uint(&mut self, id: u32, value: u64) -> &mut Self {
        let len = uint_len(value);
        self.header(id, len);
        self.buf.put_uint(value, len);
        self
    }

    pub fn float(&mut self, id: u32, value: f32) -> &mut Self {
        self.header(id, 4);
        self.buf.put_f32(value);
        self
    }

    pub fn string(&mut self, id: u32, value: &str) -> &mut Self {
        self.binary(id, value.as_bytes())
    }

    pub fn binary(&mut self, id: u32, value: &[u8]) -> &mut Self {
        self.header(id, value.len());
        self.buf.put_slice(value);
        self
    }

    /// Binary element assembled from several pieces
    pub fn binary_parts(&mut self, id: u32, parts: &[&[u8]]) -> &mut Self {
        let len = parts.iter().map(|part| part.len()).sum();
        self.header(id, len);
        for part in parts {
            self.buf.put_slice(part);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Read an element id from the start of `data`
///
/// Returns the id and its length in bytes.
pub fn read_id(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 || data.len() < len {
        return None;
    }
    let id = data[..len]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    Some((id, len))
}

/// Read a size vint from the start of `data`
///
/// Returns `None` as the value for the unknown size.
pub fn read_vint(data: &[u8]) -> Option<(Option<u64>, usize)> {
    let first = *data.first()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 || data.len() < len {
        return None;
    }
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let value = data[1..len]
        .iter()
        .fold(u64::from(first & mask), |acc, &b| (acc << 8) | u64::from(b));

    let all_ones = (1u64 << (7 * len)) - 1;
    Some(((value != all_ones).then_some(value), len))
}

/// Iterates the elements of one level of an EBML buffer
///
/// An element of unknown size extends to the end of the buffer. Iteration
/// stops at the first malformed element.
#[derive(Debug, Clone)]
pub struct EbmlReader<'a> {
    data: &'a [u8],
}

impl<'a> EbmlReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for EbmlReader<'a> {
    /// Element id and body
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, id_len) = read_id(self.data)?;
        let (size, size_len) = read_vint(&self.data[id_len..])?;
        let start = id_len + size_len;

        let end = match size {
            Some(size) => start.checked_add(usize::try_from(size).ok()?)?,
            None => self.data.len(),
        };
        if end > self.data.len() {
            self.data = &[];
            return None;
        }

        let body = &self.data[start..end];
        self.data = &self.data[end..];
        Some((id, body))
    }
}

/// Big-endian unsigned value of an integer element body
pub fn read_uint(body: &[u8]) -> u64 {
    body.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
