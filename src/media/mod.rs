//! Media units and codec helpers
//!
//! This module provides:
//! - Access unit types produced by the native mixers
//! - H.264/AVC decoder config and Annex-B rewriting
//! - AAC config parsing and ADTS framing

pub mod aac;
pub mod frame;
pub mod h264;

pub use aac::{adts_header, AudioSpecificConfig};
pub use frame::{AccessUnit, AudioUnit, Nal, VideoUnit};
pub use h264::{AvcConfig, NaluType};
