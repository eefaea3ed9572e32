// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use wlan_sentry_rs::{
    devices::key::DeviceKey,
    models::mac::MacAddr,
    phy80211::{self, alert_names},
};

use crate::unit_tests::{build_beacon, frame_at, pipeline};

fn bssid() -> MacAddr {
    "AA:BB:CC:DD:EE:10".parse().expect("mac")
}

fn run_beacons(timestamps: &[(u64, u64)]) -> (usize, u64) {
    let p = pipeline();

    for (wall_us, tsf) in timestamps {
        let data = build_beacon(bssid(), *tsf, 0x0401, &[(0, b"net".as_slice())]);
        p.chain.process_packet(&mut frame_at(*wall_us, data));
    }

    let key = DeviceKey::new(phy80211::phy_id(), bssid());
    let last_tsf = p
        .devices
        .fetch(key)
        .expect("device")
        .read(|d| d.dot11().expect("dot11").bss_timestamp);

    (
        p.alert_count(alert_names::BSS_TIMESTAMP),
        last_tsf,
    )
}

#[test]
fn test_spoofed_timeline_alerts_once_on_fifth_frame() {
    // Six beacons 100ms apart; the third through sixth run a clock one
    // second behind the legitimate progression.
    let base = 1_000_000u64;
    let frames: Vec<(u64, u64)> = (0..6)
        .map(|i| {
            let wall = base + i * 100_000;
            let tsf = if i >= 2 { wall - 1_000_000 } else { wall };
            (wall, tsf)
        })
        .collect();

    let (alerts, last_tsf) = run_beacons(&frames);

    assert_eq!(alerts, 1, "expected exactly one BSSTS alert");
    // the record retains the last observed TSF, spoofed or not
    assert_eq!(last_tsf, base + 5 * 100_000 - 1_000_000);
}

#[test]
fn test_monotonic_timeline_never_alerts() {
    let base = 1_000_000u64;
    let frames: Vec<(u64, u64)> =
        (0..10).map(|i| (base + i * 100_000, base + i * 100_000)).collect();

    let (alerts, last_tsf) = run_beacons(&frames);
    assert_eq!(alerts, 0);
    assert_eq!(last_tsf, base + 9 * 100_000);
}

#[test]
fn test_quiet_period_resets_baseline() {
    // A TSF far below the previous value is accepted after a quiet gap
    // (AP reboot), so no alert fires.
    let frames = vec![
        (1_000_000, 50_000_000),
        (1_100_000, 50_100_000),
        // 2 seconds of silence, then a restarted TSF near zero
        (3_200_000, 10_000),
        (3_300_000, 110_000),
        (3_400_000, 210_000),
        (3_500_000, 310_000),
        (3_600_000, 410_000),
    ];

    let (alerts, _) = run_beacons(&frames);
    assert_eq!(alerts, 0);
}

#[test]
fn test_single_regression_does_not_alert() {
    // One glitched beacon inside the window stays below the threshold.
    let base = 1_000_000u64;
    let frames = vec![
        (base, base),
        (base + 100_000, base + 100_000),
        (base + 200_000, 1_000),
        (base + 300_000, base + 300_000),
        (base + 400_000, base + 400_000),
    ];

    let (alerts, _) = run_beacons(&frames);
    assert_eq!(alerts, 0);
}
