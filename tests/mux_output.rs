//! Muxer sessions fed by the full object graph

mod common;

use bytes::Bytes;
use common::*;
use livecast::mux::ebml::{ids, EbmlReader};
use livecast::mux::mpegts::{PACKET_LEN, PAT_PID, PMT_PID, SYNC_BYTE, VIDEO_PID};
use livecast::mux::WriteSink;
use livecast::{MuxConsumer, MuxFormat, MuxerService, NativeEvent, ResourceKind, Runtime};

/// Start the program mixer's children and return their native senders
fn senders(
    rt: &Runtime,
    engine: &std::cell::RefCell<Engine>,
) -> (livecast::EventSender, livecast::EventSender) {
    let state = rt.mixer_state(&id(MIXER)).unwrap();
    let video = engine.borrow().sender(state.video_mixer().unwrap());
    let audio = engine.borrow().sender(state.audio_mixer().unwrap());
    (video, audio)
}

fn headers(rt: &mut Runtime, video: &livecast::EventSender, audio: &livecast::EventSender) {
    feed(rt, video, vec![NativeEvent::Headers(video_headers())]);
    feed(rt, audio, vec![NativeEvent::Headers(audio_headers())]);
}

#[test]
fn test_session_lifetime_drives_mixer() {
    let (mut rt, engine) = runtime();
    studio(&mut rt);
    let mut service = MuxerService::new();

    let (first, _a) = service.acquire(&mut rt, MuxFormat::MpegTs, &id(MIXER)).unwrap();
    let (second, _b) = service.acquire(&mut rt, MuxFormat::MpegTs, &id(MIXER)).unwrap();
    rt.settle();
    assert_eq!(engine.borrow().running(ResourceKind::VideoMixer).len(), 1);
    assert_eq!(service.session_count(), 1);

    service.release(&mut rt, first);
    rt.settle();
    assert_eq!(engine.borrow().running(ResourceKind::VideoMixer).len(), 1);

    service.release(&mut rt, second);
    rt.settle();
    assert!(engine.borrow().running(ResourceKind::VideoMixer).is_empty());
    assert!(engine.borrow().running(ResourceKind::Source).is_empty());
}

#[test]
fn test_matroska_stream() {
    let (mut rt, engine) = runtime();
    studio(&mut rt);
    let mut service = MuxerService::new();

    let (lease, subscription) = service.acquire(&mut rt, MuxFormat::Matroska, &id(MIXER)).unwrap();
    rt.settle();
    let (video, audio) = senders(&rt, &engine);
    let mut chunks = service.subscribe(lease.key()).unwrap().chunks;
    let mut consumer = MuxConsumer::new(subscription, WriteSink(Vec::new()));

    // Before the headers nothing is produced
    feed(&mut rt, &video, vec![NativeEvent::Frame(video_frame(0, true))]);
    assert!(chunks.try_recv().is_err());

    headers(&mut rt, &video, &audio);
    feed(
        &mut rt,
        &audio,
        vec![NativeEvent::Frame(audio_frame(10_000_000))],
    );
    feed(
        &mut rt,
        &video,
        vec![
            NativeEvent::Frame(video_frame(33_000_000, true)),
            NativeEvent::Frame(video_frame(66_000_000, false)),
        ],
    );

    let mut received = Vec::new();
    while let Ok(chunk) = chunks.try_recv() {
        received.push(chunk);
    }
    assert_eq!(received.len(), 3);
    assert!(!received[0].keyframe);
    assert!(received[1].keyframe);

    let written: Vec<bool> = received
        .iter()
        .map(|chunk| consumer.push(chunk).unwrap())
        .collect();
    assert_eq!(written, vec![false, true, true]);

    let output = &consumer.sink().0;
    let elements: Vec<u32> = EbmlReader::new(output).map(|(id, _)| id).collect();
    assert_eq!(elements.first(), Some(&ids::EBML));
    assert_eq!(elements.get(1), Some(&ids::SEGMENT));

    // The segment has unknown size, so the clusters read as its children
    let segment = EbmlReader::new(output).nth(1).unwrap().1;
    let children: Vec<u32> = EbmlReader::new(segment).map(|(id, _)| id).collect();
    assert_eq!(
        children,
        vec![ids::INFO, ids::TRACKS, ids::CLUSTER, ids::CLUSTER]
    );

    service.release(&mut rt, lease);
}

#[test]
fn test_mpegts_stream() {
    let (mut rt, engine) = runtime();
    studio(&mut rt);
    let mut service = MuxerService::new();

    let (lease, subscription) = service.acquire(&mut rt, MuxFormat::MpegTs, &id(MIXER)).unwrap();
    rt.settle();
    let (video, audio) = senders(&rt, &engine);
    let mut consumer = MuxConsumer::new(subscription, WriteSink(Vec::new()));
    let mut chunks = service.subscribe(lease.key()).unwrap().chunks;

    headers(&mut rt, &video, &audio);
    feed(
        &mut rt,
        &video,
        vec![
            NativeEvent::Frame(video_frame(1_000_000_000, true)),
            NativeEvent::Frame(video_frame(1_033_000_000, false)),
        ],
    );
    feed(&mut rt, &audio, vec![NativeEvent::Frame(audio_frame(1_010_000_000))]);

    while let Ok(chunk) = chunks.try_recv() {
        consumer.push(&chunk).unwrap();
    }

    let output: &[u8] = &consumer.sink().0;
    assert_eq!(output.len() % PACKET_LEN, 0);
    let packets: Vec<&[u8]> = output.chunks(PACKET_LEN).collect();
    assert!(packets.iter().all(|p| p[0] == SYNC_BYTE));

    let pid = |p: &[u8]| (u16::from(p[1] & 0x1F) << 8) | u16::from(p[2]);
    assert_eq!(pid(packets[0]), PAT_PID);
    assert_eq!(pid(packets[1]), PMT_PID);
    assert_eq!(pid(packets[2]), VIDEO_PID);
    // PAT, PMT, parameter sets, keyframe, delta frame, audio
    assert_eq!(packets.len(), 6);

    service.release(&mut rt, lease);
}

#[tokio::test]
async fn test_consumer_task_sees_stream_end() {
    let (mut rt, engine) = runtime();
    studio(&mut rt);
    let mut service = MuxerService::new();

    let (lease, subscription) = service.acquire(&mut rt, MuxFormat::Matroska, &id(MIXER)).unwrap();
    rt.settle();
    let (video, audio) = senders(&rt, &engine);
    let consumer = tokio::spawn(MuxConsumer::new(subscription, WriteSink(Vec::new())).run());

    headers(&mut rt, &video, &audio);
    feed(&mut rt, &video, vec![NativeEvent::Frame(video_frame(0, true))]);
    service.release(&mut rt, lease);
    rt.settle();

    let sink = consumer.await.unwrap().unwrap();
    let output = Bytes::from(sink.0);
    assert!(output.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]));
}
