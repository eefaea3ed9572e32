// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use axum::http::{StatusCode, header};
use bytes::Bytes;
use serde_json::json;
use wlan_sentry_rs::{
    devices::key::DeviceKey,
    models::{mac::MacAddr, ppi::DLT_IEEE802_11},
    packet::frame::Frame,
    phy80211,
};

use crate::integration_tests::{
    common::{expect_status, get_admin},
    test_server,
};

fn beacon(bssid: MacAddr, ssid: &[u8], channel: u8) -> Vec<u8> {
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
    out.push(ssid.len() as u8);
    out.extend_from_slice(ssid);
    out.push(3);
    out.push(1);
    out.push(channel);

    out
}

fn ingest(s: &crate::integration_tests::TestServer, data: Vec<u8>, ts: u64) {
    let mut frame = Frame::new(ts, DLT_IEEE802_11, Arc::from("itest0"), Bytes::from(data));
    s.chain.process_packet(&mut frame);
}

#[tokio::test]
async fn test_device_view_by_key() {
    let s = test_server();
    let bssid: MacAddr = "AA:BB:CC:DD:EE:40".parse().expect("mac");

    ingest(&s, beacon(bssid, b"lab-net", 11), 1_000_000);
    assert_eq!(s.devices.len(), 1);

    let key = DeviceKey::new(phy80211::phy_id(), bssid);
    let body = expect_status(
        &s.router,
        get_admin(&format!("/devices/by-key/{key}/device.json")),
        StatusCode::OK,
    )
    .await;

    let doc: serde_json::Value = serde_json::from_str(&body).expect("device json");
    assert_eq!(doc["kismet.device.base.macaddr"], bssid.to_string());
    assert_eq!(doc["kismet.device.base.channel"], "11");

    let ssids = doc["dot11.device"]["dot11.device.advertised_ssid_map"]
        .as_array()
        .expect("ssid vector");
    assert_eq!(ssids.len(), 1);
    assert_eq!(ssids[0]["dot11.advertisedssid.ssid"], "lab-net");
    assert_eq!(ssids[0]["dot11.advertisedssid.ssidlen"], 7);
}

#[tokio::test]
async fn test_device_list_with_field_summarization() {
    let s = test_server();

    for (i, mac) in ["AA:BB:CC:00:00:01", "AA:BB:CC:00:00:02"].iter().enumerate() {
        let bssid: MacAddr = mac.parse().expect("mac");
        ingest(&s, beacon(bssid, b"net", 6), 1_000_000 + i as u64);
    }

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/devices/all_devices/devices.json")
        .header(
            header::AUTHORIZATION,
            crate::integration_tests::common::basic_auth_header(),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({
                "fields": [
                    ["kismet.device.base.macaddr", "mac"],
                    "kismet.device.base.packets.total",
                ]
            })
            .to_string(),
        ))
        .expect("request");

    let body = expect_status(&s.router, req, StatusCode::OK).await;
    let docs: Vec<serde_json::Value> = serde_json::from_str(&body).expect("list");

    assert_eq!(docs.len(), 2);
    for d in &docs {
        let obj = d.as_object().expect("object");
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("mac"));
        assert!(obj.contains_key("kismet.device.base.packets.total"));
    }
}

#[tokio::test]
async fn test_ekjson_streams_one_device_per_line() {
    let s = test_server();

    for mac in ["AA:BB:CC:00:01:01", "AA:BB:CC:00:01:02", "AA:BB:CC:00:01:03"] {
        let bssid: MacAddr = mac.parse().expect("mac");
        ingest(&s, beacon(bssid, b"net", 1), 1_000_000);
    }

    let body = expect_status(
        &s.router,
        get_admin("/devices/all_devices/devices.ekjson"),
        StatusCode::OK,
    )
    .await;

    let lines: Vec<&str> = body.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let _doc: serde_json::Value =
            serde_json::from_str(line).expect("each line is a json doc");
    }
}

#[tokio::test]
async fn test_unknown_device_is_500_with_reason() {
    let s = test_server();
    let key = DeviceKey::new(phy80211::phy_id(), MacAddr([9; 6]));

    let body = expect_status(
        &s.router,
        get_admin(&format!("/devices/by-key/{key}/device.json")),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;
    assert!(body.contains("no such device"));
}
