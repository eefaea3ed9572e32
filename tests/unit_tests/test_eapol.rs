// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use wlan_sentry_rs::{
    devices::key::DeviceKey,
    models::mac::MacAddr,
    phy80211::{self, alert_names},
};

use crate::unit_tests::{frame_at, pipeline};

fn ap() -> MacAddr {
    "AA:BB:CC:DD:EE:20".parse().expect("mac")
}

fn client() -> MacAddr {
    "02:11:22:33:44:66".parse().expect("mac")
}

/// Builds a data frame carrying one EAPOL-Key message.
fn eapol_frame(
    from_ap: bool,
    key_info: u16,
    replay: u64,
    nonce_byte: u8,
) -> Vec<u8> {
    let mut out = Vec::new();

    if from_ap {
        // from-DS: addr1 = dest(client), addr2 = bssid, addr3 = source
        out.extend_from_slice(&0x0208u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&client().0);
        out.extend_from_slice(&ap().0);
        out.extend_from_slice(&ap().0);
    } else {
        // to-DS: addr1 = bssid, addr2 = source(client), addr3 = dest
        out.extend_from_slice(&0x0108u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&ap().0);
        out.extend_from_slice(&client().0);
        out.extend_from_slice(&ap().0);
    }
    out.extend_from_slice(&0u16.to_le_bytes());

    // LLC SNAP, 802.1X ethertype
    out.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e]);

    // 802.1X header: version, EAPOL-Key, length
    out.extend_from_slice(&[0x01, 0x03, 0x00, 0x5f]);

    // EAPOL-Key body, RSN descriptor
    out.push(0x02);
    out.extend_from_slice(&key_info.to_be_bytes());
    out.extend_from_slice(&16u16.to_be_bytes());
    out.extend_from_slice(&replay.to_be_bytes());
    out.extend_from_slice(&[nonce_byte; 32]);
    out.extend_from_slice(&[0u8; 16 + 8 + 8 + 16]);
    out.extend_from_slice(&0u16.to_be_bytes());

    out
}

const M1: u16 = 0x0088;
const M2: u16 = 0x0108;
const M3: u16 = 0x01c8;
const M4: u16 = 0x0308;

#[test]
fn test_complete_handshake_capture() {
    let p = pipeline();

    // ANonce 0xaa, SNonce 0xbb; M3 repeats the ANonce under a fresh
    // replay counter; M4 carries a zero nonce.
    let frames = [
        eapol_frame(true, M1, 1, 0xaa),
        eapol_frame(false, M2, 1, 0xbb),
        eapol_frame(true, M3, 2, 0xaa),
        eapol_frame(false, M4, 2, 0x00),
    ];

    for (i, data) in frames.into_iter().enumerate() {
        p.chain
            .process_packet(&mut frame_at(1_000_000 + i as u64 * 10_000, data));
    }

    let key = DeviceKey::new(phy80211::phy_id(), client());
    let dev = p.devices.fetch(key).expect("client device");

    dev.read(|d| {
        let d11 = d.dot11().expect("dot11 record");
        assert_eq!(d11.wpa_present_handshake, 0b11110);
        assert_eq!(d11.wpa_key_vec.len(), 4);
    });

    assert_eq!(p.alert_count(alert_names::NONCE_DUPLICATE), 0);
    assert_eq!(p.alert_count(alert_names::NONCE_ZERO), 0);
}

#[test]
fn test_replayed_m3_raises_nonce_duplicate() {
    let p = pipeline();

    let frames = [
        eapol_frame(true, M1, 1, 0xaa),
        eapol_frame(false, M2, 1, 0xbb),
        eapol_frame(true, M3, 2, 0xaa),
        // KRACK-style replay: same ANonce, incremented counter
        eapol_frame(true, M3, 3, 0xaa),
    ];

    for (i, data) in frames.into_iter().enumerate() {
        p.chain
            .process_packet(&mut frame_at(1_000_000 + i as u64 * 10_000, data));
    }

    assert_eq!(p.alert_count(alert_names::NONCE_DUPLICATE), 1);
}

#[test]
fn test_zero_nonce_in_m1_raises_alert() {
    let p = pipeline();

    p.chain
        .process_packet(&mut frame_at(1_000_000, eapol_frame(true, M1, 1, 0x00)));

    assert_eq!(p.alert_count(alert_names::NONCE_ZERO), 1);
}

#[test]
fn test_handshake_vector_capped_fifo() {
    let p = pipeline();

    // 20 M1 frames with distinct replay counters and nonces
    for i in 0..20u64 {
        p.chain.process_packet(&mut frame_at(
            1_000_000 + i * 1_000,
            eapol_frame(true, M1, i, (i + 1) as u8),
        ));
    }

    let key = DeviceKey::new(phy80211::phy_id(), client());
    let dev = p.devices.fetch(key).expect("client device");

    dev.read(|d| {
        let d11 = d.dot11().expect("dot11 record");
        assert_eq!(
            d11.wpa_key_vec.len(),
            wlan_sentry_rs::phy80211::device::WPA_KEY_VEC_CAP
        );
        // oldest evicted first
        assert_eq!(d11.wpa_key_vec.front().expect("front").replay_counter, 4);
    });
}
