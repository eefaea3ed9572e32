// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use wlan_sentry_rs::models::ppi::{
    DLT_IEEE802_11, Ppi11nMac, Ppi80211Common, PpiField, PpiGps, decode_ppi,
    encode_ppi, fixed3_7_decode, fixed3_7_encode, fixed6_4_decode, fixed6_4_encode,
};

fn common_field() -> PpiField {
    PpiField::Common(Ppi80211Common {
        tsf_timer: 0x0011_2233_4455_6677,
        flags: 1,
        rate: 108,
        freq_mhz: 2437,
        chan_flags: 0x0080,
        fhss_hopset: 0,
        fhss_pattern: 0,
        signal_dbm: -52,
        noise_dbm: -95,
    })
}

#[test]
fn test_ppi_round_trip_preserves_fields() {
    let payload = b"fake 802.11 frame body".to_vec();
    let fields = vec![
        common_field(),
        PpiField::Gps(PpiGps {
            lat: Some(44.123456),
            lon: Some(-121.765432),
            alt: Some(1200.5),
            appid: true,
        }),
        PpiField::NMac(Ppi11nMac { flags: 3, a_mpdu_id: 77, num_delimiters: 2 }),
    ];

    let wire = encode_ppi(DLT_IEEE802_11, &fields, &payload);
    let decoded = decode_ppi(&wire).expect("decode");

    assert_eq!(decoded.dlt, DLT_IEEE802_11);
    assert_eq!(decoded.payload, payload);
    assert_eq!(decoded.fields.len(), 3);

    // a second encode from the decoded fields is byte-identical
    let rewire = encode_ppi(decoded.dlt, &decoded.fields, &decoded.payload);
    assert_eq!(wire, rewire);

    match &decoded.fields[0] {
        PpiField::Common(c) => {
            assert_eq!(c.tsf_timer, 0x0011_2233_4455_6677);
            assert_eq!(c.signal_dbm, -52);
            assert_eq!(c.freq_mhz, 2437);
        },
        other => panic!("unexpected field {other:?}"),
    }

    match &decoded.fields[1] {
        PpiField::Gps(g) => {
            let lat = g.lat.expect("lat");
            let lon = g.lon.expect("lon");
            assert!((lat - 44.123456).abs() < 1e-6);
            assert!((lon + 121.765432).abs() < 1e-6);
            assert!((g.alt.expect("alt") - 1200.5).abs() < 1e-3);
            assert!(g.appid);
        },
        other => panic!("unexpected field {other:?}"),
    }
}

#[test]
fn test_ppi_header_layout() {
    let wire = encode_ppi(DLT_IEEE802_11, &[common_field()], b"xy");

    assert_eq!(wire[0], 0); // version
    let header_len = u16::from_le_bytes([wire[2], wire[3]]) as usize;
    // 8 byte header + 4 byte field header + 20 byte body
    assert_eq!(header_len, 32);
    assert_eq!(&wire[header_len..], b"xy");

    let dlt = u32::from_le_bytes([wire[4], wire[5], wire[6], wire[7]]);
    assert_eq!(dlt, DLT_IEEE802_11);
}

#[test]
fn test_fixed_point_encodings() {
    for v in [-180.0, -90.5, 0.0, 44.123456, 179.9999999] {
        let back = fixed3_7_decode(fixed3_7_encode(v));
        assert!((back - v).abs() < 1e-7, "{v} round-tripped to {back}");
    }

    for v in [-1000.0, 0.0, 8848.86, 120_000.0] {
        let back = fixed6_4_decode(fixed6_4_encode(v));
        assert!((back - v).abs() < 1e-4, "{v} round-tripped to {back}");
    }
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(decode_ppi(&[0, 0, 4]).is_err());

    // header length larger than the buffer
    let mut wire = encode_ppi(DLT_IEEE802_11, &[], b"");
    wire[2] = 0xff;
    assert!(decode_ppi(&wire).is_err());

    // bad version
    let mut wire = encode_ppi(DLT_IEEE802_11, &[], b"");
    wire[0] = 9;
    assert!(decode_ppi(&wire).is_err());
}

#[test]
fn test_unknown_fields_skipped() {
    // hand-build a record with an unknown TLV ahead of the payload
    let mut wire = Vec::new();
    wire.push(0);
    wire.push(0);
    wire.extend_from_slice(&16u16.to_le_bytes()); // 8 + 4 + 4
    wire.extend_from_slice(&DLT_IEEE802_11.to_le_bytes());
    wire.extend_from_slice(&9999u16.to_le_bytes());
    wire.extend_from_slice(&4u16.to_le_bytes());
    wire.extend_from_slice(&[1, 2, 3, 4]);
    wire.extend_from_slice(b"payload");

    let decoded = decode_ppi(&wire).expect("decode");
    assert!(decoded.fields.is_empty());
    assert_eq!(decoded.payload, b"payload");
}
