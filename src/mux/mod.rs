//! Container muxers for mixer output
//!
//! A [`MuxerService`] runs one shared [`MuxSession`] per format and mixer.
//! The session feeds the mixer's access units through a [`ContainerMuxer`]
//! and fans the resulting chunks out to any number of [`MuxConsumer`]s.
//!
//! - [`MatroskaMuxer`]: live Matroska, init segment up front
//! - [`MpegTsMuxer`]: MPEG transport stream, tables repeated per keyframe

pub mod consumer;
pub mod ebml;
pub mod frame;
pub mod matroska;
pub mod mpegts;
pub mod session;

pub use consumer::{MuxConsumer, TransportSink, WriteSink};
pub use frame::{ContainerMuxer, MuxChunk, MuxFormat, SessionKey};
pub use matroska::MatroskaMuxer;
pub use mpegts::MpegTsMuxer;
pub use session::{MuxLease, MuxSession, MuxerService, Subscription};
