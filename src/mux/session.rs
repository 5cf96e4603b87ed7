//! Shared muxer sessions
//!
//! One session runs per `(format, mixer)` pair no matter how many consumers
//! watch it. The session is a strong frame listener on the mixer, so the
//! mixer runs exactly as long as somebody holds a lease.
//!
//! ```text
//!                    MuxerService
//!            sessions: HashMap<SessionKey, Entry>
//!                         │
//!   mixer ──frames──► MuxSession ──► ContainerMuxer
//!                         │
//!                         ├── init: watch::Sender<Option<Bytes>>
//!                         └── chunks: broadcast::Sender<MuxChunk>
//!                                 │            │
//!                                 ▼            ▼
//!                          MuxConsumer    MuxConsumer
//! ```
//!
//! Frames that arrive before both header units are dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, watch};

use super::frame::{ContainerMuxer, MuxChunk, MuxFormat, SessionKey};
use super::matroska::MatroskaMuxer;
use super::mpegts::MpegTsMuxer;
use crate::error::{MuxError, Result};
use crate::media::{AudioUnit, VideoUnit};
use crate::model::{FrameListener, FrameListenerOptions};
use crate::runtime::{Disposer, Runtime};
use crate::store::ObjectId;

/// What a consumer needs to follow a session
#[derive(Debug)]
pub struct Subscription {
    /// Current init segment, `None` until both header units arrived
    pub init: watch::Receiver<Option<Bytes>>,
    pub chunks: broadcast::Receiver<MuxChunk>,
}

/// Proof of an [`MuxerService::acquire`], handed back to release it
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a lease keeps the muxer session running until released"]
pub struct MuxLease {
    key: SessionKey,
}

impl MuxLease {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

/// Encoder state of one session
pub struct MuxSession {
    key: SessionKey,
    muxer: Box<dyn ContainerMuxer>,
    video_headers: Option<Arc<VideoUnit>>,
    audio_headers: Option<Arc<AudioUnit>>,
    init_tx: watch::Sender<Option<Bytes>>,
    chunk_tx: broadcast::Sender<MuxChunk>,
    dropped: u64,
}

impl MuxSession {
    fn new(key: SessionKey, muxer: Box<dyn ContainerMuxer>, capacity: usize) -> Self {
        let (init_tx, _) = watch::channel(None);
        let (chunk_tx, _) = broadcast::channel(capacity);

        Self {
            key,
            muxer,
            video_headers: None,
            audio_headers: None,
            init_tx,
            chunk_tx,
            dropped: 0,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            init: self.init_tx.subscribe(),
            chunks: self.chunk_tx.subscribe(),
        }
    }

    pub fn has_init(&self) -> bool {
        self.init_tx.borrow().is_some()
    }

    /// Frames dropped while waiting for header units
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Rebuild the init segment once both header units are known
    fn update_init(&mut self) {
        let (Some(video), Some(audio)) = (&self.video_headers, &self.audio_headers) else {
            return;
        };

        match self.muxer.init_segment(video, audio) {
            Ok(init) => {
                tracing::info!(session = %self.key, init_len = init.len(), "Muxer initialized");
                self.init_tx.send_replace(Some(init));
            }
            Err(err) => {
                tracing::error!(session = %self.key, error = %err, "Rejected header units");
                self.init_tx.send_replace(None);
            }
        }
    }

    fn ready(&mut self) -> bool {
        if self.has_init() {
            return true;
        }
        self.dropped += 1;
        tracing::trace!(session = %self.key, dropped = self.dropped, "Frame before headers dropped");
        false
    }

    fn send(&self, chunk: MuxChunk) {
        // No receivers is fine; consumers come and go
        let _ = self.chunk_tx.send(chunk);
    }
}

impl FrameListener for MuxSession {
    fn video_headers(&mut self, _rt: &mut Runtime, unit: &Arc<VideoUnit>) {
        self.video_headers = Some(Arc::clone(unit));
        self.update_init();
    }

    fn audio_headers(&mut self, _rt: &mut Runtime, unit: &Arc<AudioUnit>) {
        self.audio_headers = Some(Arc::clone(unit));
        self.update_init();
    }

    fn video_frame(&mut self, _rt: &mut Runtime, unit: &Arc<VideoUnit>) {
        if !self.ready() {
            return;
        }
        let data = self.muxer.video_frame(unit);
        self.send(MuxChunk::new(data, unit.keyframe));
    }

    fn audio_frame(&mut self, _rt: &mut Runtime, unit: &Arc<AudioUnit>) {
        if !self.ready() {
            return;
        }
        let data = self.muxer.audio_frame(unit);
        self.send(MuxChunk::new(data, false));
    }
}

struct SessionEntry {
    session: Rc<RefCell<MuxSession>>,
    leases: usize,
    listener: Disposer,
}

/// Reference-counted registry of muxer sessions
#[derive(Default)]
pub struct MuxerService {
    sessions: HashMap<SessionKey, SessionEntry>,
}

impl MuxerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the session for `format` on `mixer`, starting it if needed
    pub fn acquire(
        &mut self,
        rt: &mut Runtime,
        format: MuxFormat,
        mixer: &ObjectId,
    ) -> Result<(MuxLease, Subscription)> {
        let key = SessionKey::new(format, mixer.clone());

        if let Some(entry) = self.sessions.get_mut(&key) {
            entry.leases += 1;
            tracing::debug!(session = %key, leases = entry.leases, "Muxer session joined");
            let subscription = entry.session.borrow().subscribe();
            return Ok((MuxLease { key }, subscription));
        }

        if rt.mixer_state(mixer).is_none() {
            return Err(MuxError::MixerNotFound(mixer.clone()).into());
        }

        let muxer: Box<dyn ContainerMuxer> = match format {
            MuxFormat::Matroska => {
                let (width, height) = picture_size(rt, mixer);
                Box::new(MatroskaMuxer::new().with_dimensions(width, height))
            }
            MuxFormat::MpegTs => Box::new(MpegTsMuxer::new(rt.config().pcr_interval)),
        };
        let session = Rc::new(RefCell::new(MuxSession::new(
            key.clone(),
            muxer,
            rt.config().mux_channel_capacity,
        )));
        let subscription = session.borrow().subscribe();

        let listener: Rc<RefCell<dyn FrameListener>> = session.clone();
        let options = FrameListenerOptions {
            emit_init_headers: true,
            weak: false,
        };
        let listener = rt.add_frame_listener(mixer, listener, options)?;

        tracing::info!(session = %key, "Muxer session started");
        self.sessions.insert(
            key.clone(),
            SessionEntry {
                session,
                leases: 1,
                listener,
            },
        );

        Ok((MuxLease { key }, subscription))
    }

    /// Give back a lease; the last one stops the session
    pub fn release(&mut self, rt: &mut Runtime, lease: MuxLease) {
        let Some(entry) = self.sessions.get_mut(&lease.key) else {
            return;
        };
        entry.leases = entry.leases.saturating_sub(1);
        if entry.leases > 0 {
            tracing::debug!(session = %lease.key, leases = entry.leases, "Muxer session left");
            return;
        }

        if let Some(entry) = self.sessions.remove(&lease.key) {
            entry.listener.dispose(rt);
            tracing::info!(
                session = %lease.key,
                dropped = entry.session.borrow().dropped(),
                "Muxer session stopped"
            );
        }
    }

    /// Another subscription to a running session, without taking a lease
    pub fn subscribe(&self, key: &SessionKey) -> Option<Subscription> {
        self.sessions
            .get(key)
            .map(|entry| entry.session.borrow().subscribe())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Leases held on a session
    pub fn leases(&self, key: &SessionKey) -> usize {
        self.sessions.get(key).map_or(0, |entry| entry.leases)
    }
}

/// Picture size the mixer renders at, from `cfg.video`
fn picture_size(rt: &Runtime, mixer: &ObjectId) -> (u32, u32) {
    let video = rt.object(mixer).and_then(|obj| obj.cfg.get("video"));
    let dimension = |key: &str, default: u32| {
        video
            .and_then(|video| video.get(key))
            .and_then(|value| value.as_u64())
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(default)
    };
    (dimension("width", 1280), dimension("height", 720))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::media::Nal;
    use crate::model::{self, MIXER};
    use crate::native::testing::NullBackend;
    use crate::scope::Event;

    fn runtime() -> (Runtime, ObjectId) {
        let mut rt = Runtime::new(Rc::new(NullBackend), RuntimeConfig::default());
        model::install(&mut rt);
        let mixer = rt.create(json!({"type": MIXER}), None).unwrap();
        rt.settle();
        (rt, mixer)
    }

    fn emit(rt: &mut Runtime, mixer: &ObjectId, event: Event) {
        let scope = rt.object(mixer).unwrap().scope();
        rt.emit(scope, &event);
    }

    fn video_headers() -> Event {
        Event::VideoHeaders(Arc::new(VideoUnit::new(
            0,
            0,
            true,
            vec![
                Nal::from_payload(&[0x67, 0x42, 0x00, 0x1E]),
                Nal::from_payload(&[0x68, 0xCE]),
            ],
        )))
    }

    fn audio_headers() -> Event {
        Event::AudioHeaders(Arc::new(AudioUnit::new(0, Bytes::from_static(&[0x12, 0x10]))))
    }

    fn keyframe() -> Event {
        Event::VideoFrame(Arc::new(VideoUnit::new(
            0,
            0,
            true,
            vec![Nal::from_payload(&[0x65, 0x88])],
        )))
    }

    #[test]
    fn test_acquire_shares_session() {
        let (mut rt, mixer) = runtime();
        let mut service = MuxerService::new();

        let (first, _sub1) = service.acquire(&mut rt, MuxFormat::Matroska, &mixer).unwrap();
        let (second, _sub2) = service.acquire(&mut rt, MuxFormat::Matroska, &mixer).unwrap();
        let (other, _sub3) = service.acquire(&mut rt, MuxFormat::MpegTs, &mixer).unwrap();

        assert_eq!(service.session_count(), 2);
        assert_eq!(service.leases(first.key()), 2);
        assert_eq!(rt.mixer_state(&mixer).unwrap().num_frame_listeners(), 2);

        service.release(&mut rt, first);
        assert_eq!(service.session_count(), 2);
        service.release(&mut rt, second);
        service.release(&mut rt, other);

        assert_eq!(service.session_count(), 0);
        assert_eq!(rt.mixer_state(&mixer).unwrap().num_frame_listeners(), 0);
    }

    #[test]
    fn test_acquire_unknown_mixer() {
        let (mut rt, _) = runtime();
        let mut service = MuxerService::new();

        let result = service.acquire(&mut rt, MuxFormat::MpegTs, &ObjectId::new("mixer:nope"));
        assert!(matches!(
            result,
            Err(crate::Error::Mux(MuxError::MixerNotFound(_)))
        ));
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn test_frames_before_headers_are_dropped() {
        let (mut rt, mixer) = runtime();
        let mut service = MuxerService::new();
        let (lease, mut sub) = service.acquire(&mut rt, MuxFormat::Matroska, &mixer).unwrap();

        emit(&mut rt, &mixer, keyframe());
        assert!(sub.chunks.try_recv().is_err());
        assert!(sub.init.borrow().is_none());

        emit(&mut rt, &mixer, video_headers());
        emit(&mut rt, &mixer, keyframe());
        assert!(sub.chunks.try_recv().is_err());

        emit(&mut rt, &mixer, audio_headers());
        assert!(sub.init.has_changed().unwrap());
        let init = sub.init.borrow_and_update().clone().unwrap();
        assert_eq!(&init[..4], &[0x1A, 0x45, 0xDF, 0xA3]);

        emit(&mut rt, &mixer, keyframe());
        let chunk = sub.chunks.try_recv().unwrap();
        assert!(chunk.keyframe);

        service.release(&mut rt, lease);
    }

    #[test]
    fn test_late_session_primed_with_cached_headers() {
        let (mut rt, mixer) = runtime();
        let mut service = MuxerService::new();

        // Keep the mixer running so its children exist
        let (first, _sub) = service.acquire(&mut rt, MuxFormat::Matroska, &mixer).unwrap();
        rt.settle();
        let video_mixer = rt.mixer_state(&mixer).unwrap().video_mixer().cloned().unwrap();
        let audio_mixer = rt.mixer_state(&mixer).unwrap().audio_mixer().cloned().unwrap();

        let Event::VideoHeaders(video) = video_headers() else { unreachable!() };
        let Event::AudioHeaders(audio) = audio_headers() else { unreachable!() };
        emit(&mut rt, &video_mixer, Event::Headers(crate::media::AccessUnit::Video(video)));
        emit(&mut rt, &audio_mixer, Event::Headers(crate::media::AccessUnit::Audio(audio)));

        let (second, sub) = service.acquire(&mut rt, MuxFormat::MpegTs, &mixer).unwrap();
        // MPEG-TS carries its tables in-band
        assert_eq!(sub.init.borrow().as_ref().map(|init| init.len()), Some(0));

        service.release(&mut rt, second);
        service.release(&mut rt, first);
    }

    #[test]
    fn test_bad_headers_logged_not_fatal() {
        let (mut rt, mixer) = runtime();
        let mut service = MuxerService::new();
        let (lease, mut sub) = service.acquire(&mut rt, MuxFormat::MpegTs, &mixer).unwrap();

        let no_sps = Event::VideoHeaders(Arc::new(VideoUnit::new(
            0,
            0,
            true,
            vec![Nal::from_payload(&[0x68, 0xCE])],
        )));
        emit(&mut rt, &mixer, no_sps);
        emit(&mut rt, &mixer, audio_headers());
        emit(&mut rt, &mixer, keyframe());

        assert!(sub.init.borrow().is_none());
        assert!(sub.chunks.try_recv().is_err());
        assert!(!rt.object(&mixer).unwrap().has_error());

        service.release(&mut rt, lease);
    }
}
