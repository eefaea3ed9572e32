// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use tokio_stream::StreamExt;
use wlan_sentry_rs::{
    logs::pcap_http::open_pcap_stream,
    models::mac::MacAddr,
    packet::chain::ChainPos,
    phy80211::packinfo::Dot11PackInfo,
    stream::StreamTracker,
};

use crate::unit_tests::{build_beacon, frame_at, pipeline};

fn bssid() -> MacAddr {
    "AA:BB:CC:DD:EE:30".parse().expect("mac")
}

fn open_test_stream(
    p: &crate::unit_tests::TestPipeline,
    streams: &Arc<StreamTracker>,
) -> wlan_sentry_rs::logs::pcap_http::PcapStreamBody {
    let comp_dot11 = p.comp_dot11;
    let mac = bssid();

    open_pcap_stream(
        Arc::clone(&p.chain),
        Arc::clone(streams),
        p.comp_l1,
        p.comp_gps,
        "test-stream",
        "test pcap stream",
        Box::new(move |frame| {
            frame
                .get::<Dot11PackInfo>(comp_dot11)
                .is_some_and(|info| info.bssid() == mac)
        }),
    )
}

#[tokio::test]
async fn test_stream_delivers_matching_frames() {
    let p = pipeline();
    let streams = Arc::new(StreamTracker::new(&p.registry));

    let logging_handlers = p.chain.handler_count(ChainPos::Logging);
    let mut body = open_test_stream(&p, &streams);
    assert_eq!(p.chain.handler_count(ChainPos::Logging), logging_handlers + 1);
    assert_eq!(streams.len(), 1);

    // first chunk is the section header, sent at subscription time
    let shb = body.next().await.expect("shb chunk").expect("chunk ok");
    assert_eq!(&shb[..4], &[0x0a, 0x0d, 0x0d, 0x0a]);

    // matching frame produces a chunk
    let beacon = build_beacon(bssid(), 1_000_000, 0x0401, &[(0, b"s".as_slice())]);
    p.chain.process_packet(&mut frame_at(1_000_000, beacon));

    let chunk = body.next().await.expect("packet chunk").expect("chunk ok");
    assert!(!chunk.is_empty());

    // non-matching frame produces nothing the next matching one overtakes
    let other: MacAddr = "AA:BB:CC:DD:EE:31".parse().expect("mac");
    let unrelated = build_beacon(other, 2_000_000, 0x0401, &[(0, b"o".as_slice())]);
    p.chain.process_packet(&mut frame_at(2_000_000, unrelated));

    let beacon2 = build_beacon(bssid(), 3_000_000, 0x0401, &[(0, b"s".as_slice())]);
    p.chain.process_packet(&mut frame_at(3_000_000, beacon2));

    let chunk = body.next().await.expect("second packet chunk").expect("chunk ok");
    assert!(!chunk.is_empty());
}

#[tokio::test]
async fn test_disconnect_unregisters_handler_and_stream() {
    let p = pipeline();
    let streams = Arc::new(StreamTracker::new(&p.registry));

    let before = p.chain.handler_count(ChainPos::Logging);

    {
        let mut body = open_test_stream(&p, &streams);
        let _ = body.next().await;
        assert_eq!(streams.len(), 1);
        // subscriber disconnects: the body drops here
    }

    assert_eq!(p.chain.handler_count(ChainPos::Logging), before);
    assert_eq!(streams.len(), 0);

    // frames after disconnect go nowhere and nothing leaks
    let beacon = build_beacon(bssid(), 1_000_000, 0x0401, &[(0, b"s".as_slice())]);
    p.chain.process_packet(&mut frame_at(1_000_000, beacon));
}

#[tokio::test]
async fn test_api_stop_terminates_stream() {
    let p = pipeline();
    let streams = Arc::new(StreamTracker::new(&p.registry));

    let mut body = open_test_stream(&p, &streams);
    let _ = body.next().await;

    let id = {
        let el = streams.to_element();
        // single registered stream
        assert_eq!(streams.len(), 1);
        drop(el);
        1
    };

    assert!(streams.stop(id));

    // cancellation ends the stream
    assert!(body.next().await.is_none());
}

#[tokio::test]
async fn test_paused_stream_drops_frames() {
    let p = pipeline();
    let streams = Arc::new(StreamTracker::new(&p.registry));

    let mut body = open_test_stream(&p, &streams);
    let _ = body.next().await;

    assert!(streams.pause(1));

    let beacon = build_beacon(bssid(), 1_000_000, 0x0401, &[(0, b"s".as_slice())]);
    p.chain.process_packet(&mut frame_at(1_000_000, beacon));

    // nothing queued while paused
    let pending = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        body.next(),
    )
    .await;
    assert!(pending.is_err());

    assert!(streams.resume(1));
    let beacon = build_beacon(bssid(), 2_000_000, 0x0401, &[(0, b"s".as_slice())]);
    p.chain.process_packet(&mut frame_at(2_000_000, beacon));

    let chunk = body.next().await.expect("post-resume chunk").expect("chunk ok");
    assert!(!chunk.is_empty());
}
