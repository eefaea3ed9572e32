// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use tokio_stream::StreamExt;
use wlan_sentry_rs::{
    models::{mac::MacAddr, ppi::DLT_IEEE802_11},
    packet::{chain::ChainPos, frame::Frame},
};

use crate::integration_tests::{
    common::{expect_status, get_admin, send},
    test_server,
};

#[tokio::test]
async fn test_log_drivers_enumeration() {
    let s = test_server();

    let body = expect_status(
        &s.router,
        get_admin("/logging/drivers"),
        StatusCode::OK,
    )
    .await;

    let drivers: Vec<serde_json::Value> =
        serde_json::from_str(&body).expect("drivers json");
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0]["kismet.logtracker.driver.class"], "pcapng");
    assert_eq!(drivers[0]["kismet.logtracker.driver.singleton"], true);
}

#[tokio::test]
async fn test_log_open_stop_lifecycle() {
    let s = test_server();

    // nothing active yet
    let body =
        expect_status(&s.router, get_admin("/logging/active"), StatusCode::OK).await;
    let active: Vec<serde_json::Value> =
        serde_json::from_str(&body).expect("active json");
    assert!(active.is_empty());

    // start a pcapng log
    let body = expect_status(
        &s.router,
        get_admin("/logging/by-class/pcapng/start"),
        StatusCode::OK,
    )
    .await;
    let started: serde_json::Value = serde_json::from_str(&body).expect("start json");
    let uuid = started["uuid"].as_str().expect("uuid").to_string();

    // the file exists on disk under the scratch prefix
    let path = started["path"].as_str().expect("path").to_string();
    assert!(std::path::Path::new(&path).exists());

    // singleton: a second open fails
    expect_status(
        &s.router,
        get_admin("/logging/by-class/pcapng/start"),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;

    // active shows the open log
    let body =
        expect_status(&s.router, get_admin("/logging/active"), StatusCode::OK).await;
    let active: Vec<serde_json::Value> =
        serde_json::from_str(&body).expect("active json");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["kismet.logtracker.log.open"], true);

    // stop it
    expect_status(
        &s.router,
        get_admin(&format!("/logging/by-uuid/{uuid}/stop")),
        StatusCode::OK,
    )
    .await;

    let body =
        expect_status(&s.router, get_admin("/logging/active"), StatusCode::OK).await;
    let active: Vec<serde_json::Value> =
        serde_json::from_str(&body).expect("active json");
    assert_eq!(active[0]["kismet.logtracker.log.open"], false);

    // a closed log never reopens; a new instance gets a new uuid and path
    let body = expect_status(
        &s.router,
        get_admin("/logging/by-class/pcapng/start"),
        StatusCode::OK,
    )
    .await;
    let second: serde_json::Value = serde_json::from_str(&body).expect("start json");
    assert_ne!(second["uuid"], started["uuid"]);
    assert_ne!(second["path"], started["path"]);
}

#[tokio::test]
async fn test_stop_unknown_log_errors() {
    let s = test_server();

    expect_status(
        &s.router,
        get_admin(&format!("/logging/by-uuid/{}/stop", uuid::Uuid::new_v4())),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;
}

fn beacon_for(bssid: MacAddr) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0080u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&MacAddr::BROADCAST.0);
    out.extend_from_slice(&bssid.0);
    out.extend_from_slice(&bssid.0);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1_000_000u64.to_le_bytes());
    out.extend_from_slice(&100u16.to_le_bytes());
    out.extend_from_slice(&0x0401u16.to_le_bytes());
    out.push(0);
    out.push(3);
    out.extend_from_slice(b"net");
    out
}

#[tokio::test]
async fn test_by_bssid_pcap_stream_and_cancel() {
    let s = test_server();
    let bssid: MacAddr = "AA:BB:CC:DD:EE:50".parse().expect("mac");

    // stream for an untracked device 404s
    expect_status(
        &s.router,
        get_admin(&format!("/phy/phy80211/by-bssid/{bssid}/pcap/{bssid}.pcapng")),
        StatusCode::NOT_FOUND,
    )
    .await;

    // track the device
    let mut frame = Frame::new(
        1_000_000,
        DLT_IEEE802_11,
        Arc::from("itest0"),
        Bytes::from(beacon_for(bssid)),
    );
    s.chain.process_packet(&mut frame);

    let logging_before = s.chain.handler_count(ChainPos::Logging);

    let resp = send(
        &s.router,
        get_admin(&format!("/phy/phy80211/by-bssid/{bssid}/pcap/{bssid}.pcapng")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(s.state.streams.len(), 1);
    assert_eq!(s.chain.handler_count(ChainPos::Logging), logging_before + 1);

    let mut data = resp.into_body().into_data_stream();

    // first chunk carries the pcapng section header
    let shb = data.next().await.expect("shb chunk").expect("chunk ok");
    assert_eq!(&shb[..4], &[0x0a, 0x0d, 0x0d, 0x0a]);

    // a matching frame shows up as a packet chunk
    let mut frame = Frame::new(
        2_000_000,
        DLT_IEEE802_11,
        Arc::from("itest0"),
        Bytes::from(beacon_for(bssid)),
    );
    s.chain.process_packet(&mut frame);

    let chunk = data.next().await.expect("packet chunk").expect("chunk ok");
    assert!(!chunk.is_empty());

    // client disconnect: dropping the body tears the stream down
    drop(data);

    assert_eq!(s.state.streams.len(), 0);
    assert_eq!(s.chain.handler_count(ChainPos::Logging), logging_before);
}

#[tokio::test]
async fn test_pcap_stream_rejects_mismatched_filename() {
    let s = test_server();
    let bssid: MacAddr = "AA:BB:CC:DD:EE:51".parse().expect("mac");

    let mut frame = Frame::new(
        1_000_000,
        DLT_IEEE802_11,
        Arc::from("itest0"),
        Bytes::from(beacon_for(bssid)),
    );
    s.chain.process_packet(&mut frame);

    expect_status(
        &s.router,
        get_admin(&format!(
            "/phy/phy80211/by-bssid/{bssid}/pcap/other.pcapng"
        )),
        StatusCode::NOT_FOUND,
    )
    .await;
}
