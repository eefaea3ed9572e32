// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use wlan_sentry_rs::packet::{
    chain::{ChainPos, PacketChain},
    frame::Frame,
};

fn test_frame() -> Frame {
    Frame::new(0, 105, Arc::from("t"), Bytes::from_static(b"abcd"))
}

fn counter_handler(
    counter: &Arc<AtomicUsize>,
) -> Box<dyn wlan_sentry_rs::packet::chain::ChainHandler> {
    let counter = Arc::clone(counter);
    Box::new(move |_f: &mut Frame| {
        counter.fetch_add(1, Ordering::SeqCst);
        1
    })
}

#[test]
fn test_filtered_frame_skips_logging_but_not_destroy() {
    let chain = PacketChain::new();
    let logged = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));

    chain.register_handler(ChainPos::Logging, 0, counter_handler(&logged));
    chain.register_handler(ChainPos::Destroy, 0, counter_handler(&destroyed));

    // a postcap stage filters the frame
    chain.register_handler(
        ChainPos::PostCap,
        0,
        Box::new(|f: &mut Frame| {
            f.filtered = true;
            1
        }),
    );

    chain.process_packet(&mut test_frame());

    assert_eq!(logged.load(Ordering::SeqCst), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_positions_run_in_declared_order() {
    let chain = PacketChain::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    // register in reverse to prove ordering comes from position, not
    // registration
    for (pos, tag) in [
        (ChainPos::Destroy, "destroy"),
        (ChainPos::Tracker, "tracker"),
        (ChainPos::Classifier, "classifier"),
        (ChainPos::PostCap, "postcap"),
    ] {
        let order = Arc::clone(&order);
        chain.register_handler(
            pos,
            0,
            Box::new(move |_f: &mut Frame| {
                order.lock().expect("lock").push(tag);
                1
            }),
        );
    }

    chain.process_packet(&mut test_frame());

    assert_eq!(
        *order.lock().expect("lock"),
        vec!["postcap", "classifier", "tracker", "destroy"]
    );
}

#[test]
fn test_components_attached_by_stages_accumulate() {
    let chain = PacketChain::new();
    let a = chain.register_packet_component("stage.a");
    let b = chain.register_packet_component("stage.b");

    chain.register_handler(
        ChainPos::PostCap,
        0,
        Box::new(move |f: &mut Frame| {
            f.insert(a, 1u32).expect("attach a");
            1
        }),
    );

    // the later stage sees the earlier component and adds its own
    chain.register_handler(
        ChainPos::Classifier,
        0,
        Box::new(move |f: &mut Frame| {
            assert_eq!(f.get::<u32>(a), Some(&1));
            f.insert(b, "two".to_string()).expect("attach b");
            1
        }),
    );

    let mut frame = test_frame();
    chain.process_packet(&mut frame);

    let ids = frame.component_ids();
    assert!(ids.contains(&a));
    assert!(ids.contains(&b));
}

#[test]
fn test_handler_set_mutation_between_packets() {
    let chain = PacketChain::new();
    let count = Arc::new(AtomicUsize::new(0));

    let id = chain.register_handler(ChainPos::Logging, 0, counter_handler(&count));
    chain.process_packet(&mut test_frame());
    assert_eq!(count.load(Ordering::SeqCst), 1);

    chain.remove_handler(ChainPos::Logging, id);
    chain.process_packet(&mut test_frame());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
