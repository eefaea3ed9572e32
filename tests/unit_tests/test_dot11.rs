// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use wlan_sentry_rs::{
    devices::key::DeviceKey,
    models::{
        dot11::{
            header::{FrameType, decode_header},
            rsn::CryptSet,
            tags::parse_supported_channels,
        },
        mac::MacAddr,
    },
    phy80211::{self, device::Dot11TypeSet, packinfo::dissect},
};

use crate::unit_tests::{build_beacon, build_probe_resp, frame_at, pipeline};

fn bssid() -> MacAddr {
    "AA:BB:CC:DD:EE:01".parse().expect("mac")
}

// RSN: version 1, group CCMP, pairwise CCMP, AKM PSK
const RSN_CCMP_PSK: &[u8] = &[
    0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, 0x01, 0x00, 0x00, 0x0f, 0xac, 0x04,
    0x01, 0x00, 0x00, 0x0f, 0xac, 0x02, 0x00, 0x00,
];

fn beacon_ies<'a>() -> Vec<(u8, &'a [u8])> {
    vec![
        (0, b"test".as_slice()),
        (1, &[0x82, 0x84, 0x8b, 0x96]),
        (3, &[6]),
        (48, RSN_CCMP_PSK),
    ]
}

#[test]
fn test_beacon_classification() {
    let p = pipeline();

    let data = build_beacon(bssid(), 1_000_000, 0x0411, &beacon_ies());
    let mut frame = frame_at(1_000_000, data);
    p.chain.process_packet(&mut frame);

    let key = DeviceKey::new(phy80211::phy_id(), bssid());
    let dev = p.devices.fetch(key).expect("device tracked");

    dev.read(|d| {
        assert_eq!(d.packets, 1);
        assert_eq!(d.channel, "6");

        let d11 = d.dot11().expect("dot11 record");
        assert!(d11.type_set.contains(Dot11TypeSet::BEACON_AP));
        assert_eq!(d11.advertised_ssids.len(), 1);

        let ssid = d11.advertised_ssids.values().next().expect("ssid");
        assert_eq!(ssid.ssid, "test");
        assert_eq!(ssid.ssid_len, 4);
        assert_eq!(ssid.channel, "6");
        assert_eq!(ssid.beacons_sec, 1);
        assert!(ssid.ssid_beacon);
        assert!(!ssid.ssid_probe_response);
        assert!(ssid.crypt_set.contains(CryptSet::CCMP));
        assert!(ssid.crypt_set.contains(CryptSet::AKM_PSK));
    });
}

#[test]
fn test_probe_response_merges_into_same_ssid() {
    let p = pipeline();

    let ies = beacon_ies();
    let beacon = build_beacon(bssid(), 1_000_000, 0x0411, &ies);
    let probe = build_probe_resp(
        bssid(),
        "02:00:00:00:00:01".parse().expect("mac"),
        2_000_000,
        &ies,
    );

    p.chain.process_packet(&mut frame_at(1_000_000, beacon));
    p.chain.process_packet(&mut frame_at(2_000_000, probe));

    let key = DeviceKey::new(phy80211::phy_id(), bssid());
    let dev = p.devices.fetch(key).expect("device tracked");

    dev.read(|d| {
        let d11 = d.dot11().expect("dot11 record");
        // identical IE layout, one advertised-SSID record
        assert_eq!(d11.advertised_ssids.len(), 1);

        let ssid = d11.advertised_ssids.values().next().expect("ssid");
        assert!(ssid.ssid_beacon);
        assert!(ssid.ssid_probe_response);
        // probe responses do not count toward the beacon rate
        assert_eq!(ssid.beacons_sec, 1);

        assert!(d11.type_set.contains(Dot11TypeSet::BEACON_AP));
        assert!(d11.type_set.contains(Dot11TypeSet::PROBE_AP));
    });
}

#[test]
fn test_duplicate_frame_flagged() {
    let p = pipeline();

    let data = build_beacon(bssid(), 1_000_000, 0x0411, &beacon_ies());

    let mut first = frame_at(1_000_000, data.clone());
    p.chain.process_packet(&mut first);
    assert!(!first.duplicate);

    let mut second = frame_at(1_100_000, data);
    p.chain.process_packet(&mut second);
    assert!(second.duplicate);
}

#[test]
fn test_component_set_grows_monotonically() {
    let p = pipeline();

    let data = build_beacon(bssid(), 1_000_000, 0x0411, &beacon_ies());
    let mut frame = frame_at(1_000_000, data);

    let before = frame.component_ids();
    p.chain.process_packet(&mut frame);
    let after = frame.component_ids();

    for id in &before {
        assert!(after.contains(id), "component {id} lost during processing");
    }
    assert!(after.len() > before.len());
    assert!(frame.has(p.comp_dot11));
}

#[test]
fn test_truncated_header_sets_error_but_still_logs() {
    let p = pipeline();

    let mut frame = frame_at(1_000_000, vec![0x80, 0x00, 0x00]);
    p.chain.process_packet(&mut frame);

    assert!(frame.error);
    assert!(!frame.has(p.comp_dot11));
}

#[test]
fn test_ds_address_resolution() {
    // to-DS data frame: addr1 = bssid, addr2 = source, addr3 = dest
    let mut data = Vec::new();
    data.extend_from_slice(&0x0108u16.to_le_bytes()); // data, to_ds
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&bssid().0);
    let client: MacAddr = "02:11:22:33:44:55".parse().expect("mac");
    data.extend_from_slice(&client.0);
    let dest: MacAddr = "AA:BB:CC:00:00:99".parse().expect("mac");
    data.extend_from_slice(&dest.0);
    data.extend_from_slice(&0u16.to_le_bytes());

    let hdr = decode_header(&data).expect("decode");
    assert_eq!(hdr.frame_type, FrameType::Data);
    assert!(hdr.to_ds);
    assert!(!hdr.from_ds);
    assert_eq!(hdr.bssid, bssid());
    assert_eq!(hdr.source, client);
    assert_eq!(hdr.dest, dest);
}

#[test]
fn test_data_frame_marks_client_of_bss() {
    let p = pipeline();

    let mut data = Vec::new();
    data.extend_from_slice(&0x0108u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&bssid().0);
    let client: MacAddr = "02:11:22:33:44:55".parse().expect("mac");
    data.extend_from_slice(&client.0);
    data.extend_from_slice(&MacAddr::BROADCAST.0);
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(b"payload");

    p.chain.process_packet(&mut frame_at(1_000_000, data));

    let ckey = DeviceKey::new(phy80211::phy_id(), client);
    let cdev = p.devices.fetch(ckey).expect("client tracked");
    cdev.read(|d| {
        let d11 = d.dot11().expect("dot11 record");
        assert!(d11.type_set.contains(Dot11TypeSet::CLIENT));
        let rec = d11.client_map.get(&bssid()).expect("client record");
        assert_eq!(rec.bssid, bssid());
        assert!(rec.bytes > 0);
    });

    let bkey = DeviceKey::new(phy80211::phy_id(), bssid());
    let bdev = p.devices.fetch(bkey).expect("bssid tracked");
    bdev.read(|d| {
        let d11 = d.dot11().expect("dot11 record");
        assert!(d11.associated_clients.contains_key(&client));
    });
}

#[test]
fn test_supported_channels_enumerates_run() {
    // The element encodes (start, count) pairs; each run expands to the
    // channels start..start+count, not count copies of the last channel.
    let channels = parse_supported_channels(&[36, 4]).expect("parse");
    assert_eq!(channels, vec![36, 37, 38, 39]);

    let multi = parse_supported_channels(&[1, 3, 36, 2]).expect("parse");
    assert_eq!(multi, vec![1, 2, 3, 36, 37]);

    assert!(parse_supported_channels(&[250, 10]).is_err());
}

#[test]
fn test_dissect_oversize_ssid_flagged() {
    let long = [b'x'; 33];
    let data = build_beacon(bssid(), 1, 0x0401, &[(0, long.as_slice())]);

    let info = dissect(&data).expect("dissect");
    assert!(info.ssid_oversize);
    assert_eq!(info.ssid.expect("ssid").raw.len(), 33);
}

#[test]
fn test_ie_fingerprint_reflects_layout() {
    let a = dissect(&build_beacon(bssid(), 1, 0, &beacon_ies())).expect("dissect");

    let mut reordered = beacon_ies();
    reordered.swap(1, 2);
    let b =
        dissect(&build_beacon(bssid(), 1, 0, &reordered)).expect("dissect");

    assert_ne!(a.ietag_csum, 0);
    assert_ne!(a.ietag_csum, b.ietag_csum);
    assert_eq!(a.ie_order.len(), 4);
}
