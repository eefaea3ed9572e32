// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::Write;

use flate2::{Compression, write::GzEncoder};
use serial_test::serial;
use wlan_sentry_rs::{
    lookups::{
        bt_ids::{BtManufTracker, BtOidTracker},
        icao::IcaoTracker,
        indexed::{IndexedGzipTable, LineFormat},
        oui::{OuiFormat, OuiTracker},
    },
    models::mac::MacAddr,
};

fn write_gz(path: &std::path::Path, lines: &[String]) {
    let file = std::fs::File::create(path).expect("create gz");
    let mut enc = GzEncoder::new(file, Compression::default());
    for l in lines {
        enc.write_all(l.as_bytes()).expect("write line");
        enc.write_all(b"\n").expect("write nl");
    }
    enc.finish().expect("finish gz");
}

/// Generates a sorted OUI table large enough to need several index slots.
fn oui_table(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("manuf.txt.gz");

    let mut lines = vec!["# manuf table".to_string()];
    for i in 0..500u32 {
        let oui = i * 7;
        lines.push(format!(
            "{:02X}:{:02X}:{:02X}\tVendor {}",
            (oui >> 16) & 0xff,
            (oui >> 8) & 0xff,
            oui & 0xff,
            i
        ));
    }

    write_gz(&path, &lines);
    path
}

#[test]
#[serial]
fn test_indexed_lookup_hits_between_index_points() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = oui_table(dir.path());

    let table = IndexedGzipTable::open(&path, OuiFormat);

    // entries both on and between the every-50th-line index slots
    assert_eq!(table.lookup(0).as_deref(), Some("Vendor 0"));
    assert_eq!(table.lookup(7 * 123).as_deref(), Some("Vendor 123"));
    assert_eq!(table.lookup(7 * 499).as_deref(), Some("Vendor 499"));

    // a key between records resolves to nothing and caches the miss
    assert!(table.lookup(3).is_none());
    assert!(table.lookup(3).is_none());
    assert!(table.lookup(7 * 500).is_none());
}

#[test]
fn test_disabled_table_answers_none() {
    let table = IndexedGzipTable::disabled(OuiFormat);
    assert!(table.lookup(0x0050f2).is_none());
}

#[test]
fn test_oui_tracker_randomized_and_unknown() {
    let tracker = OuiTracker::disabled();

    // locally-administered MACs resolve without a table
    let random: MacAddr = "02:00:00:11:22:33".parse().expect("mac");
    assert_eq!(&*tracker.lookup(random), "Randomized");

    let unknown: MacAddr = "00:00:03:00:00:01".parse().expect("mac");
    assert_eq!(&*tracker.lookup(unknown), "Unknown");
}

#[test]
#[serial]
fn test_preloaded_entries_win() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = oui_table(dir.path());

    let table = IndexedGzipTable::open(&path, OuiFormat);
    table.preload(0x000007, "Preloaded Vendor".to_string());

    assert_eq!(table.lookup(0x000007).as_deref(), Some("Preloaded Vendor"));
}

#[test]
#[serial]
fn test_icao_registration_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("icao.txt.gz");

    // tab-separated: hex icao, registration, type, model, owner
    let lines: Vec<String> = (0..150u32)
        .map(|i| {
            format!(
                "{:06X}\tN{}AB\tFixed Wing\tCessna 172 S\tExample Air {}",
                i * 5,
                i,
                i
            )
        })
        .collect();
    write_gz(&path, &lines);

    let tracker = IcaoTracker::open(&path);

    let rec = tracker.lookup(5 * 77).expect("registered icao");
    assert_eq!(rec.icao, 5 * 77);
    assert_eq!(rec.registration, "N77AB");
    assert_eq!(rec.atype, "Fixed Wing");
    assert_eq!(rec.model, "Cessna 172 S");
    assert_eq!(rec.owner, "Example Air 77");

    // between records and past the table both miss
    assert!(tracker.lookup(3).is_none());
    assert!(tracker.lookup(5 * 150).is_none());

    assert!(IcaoTracker::disabled().lookup(0).is_none());
}

#[test]
#[serial]
fn test_bt_oid_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bt_oids.txt.gz");

    let lines: Vec<String> = (0..120u32)
        .map(|i| format!("{:X}\tService {}", 0x1800 + i * 2, i))
        .collect();
    write_gz(&path, &lines);

    let tracker = BtOidTracker::open(&path);
    assert_eq!(tracker.lookup_oid(0x1800).as_deref(), Some("Service 0"));
    assert_eq!(
        tracker.lookup_oid(0x1800 + 2 * 63).as_deref(),
        Some("Service 63")
    );
    assert!(tracker.lookup_oid(0x1801).is_none());
    assert!(BtOidTracker::disabled().lookup_oid(0x1800).is_none());
}

#[test]
#[serial]
fn test_bt_manuf_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bt.txt.gz");

    let lines: Vec<String> = (0..120u32)
        .map(|i| format!("{:X}\tCompany {}", i * 3, i))
        .collect();
    write_gz(&path, &lines);

    let tracker = BtManufTracker::open(&path);
    assert_eq!(tracker.lookup_manuf(0).as_deref(), Some("Company 0"));
    assert_eq!(tracker.lookup_manuf(3 * 77).as_deref(), Some("Company 77"));
    assert!(tracker.lookup_manuf(1).is_none());
}

struct DecimalFormat;

impl LineFormat for DecimalFormat {
    fn parse_key(&self, line: &str) -> Option<u64> {
        line.split('\t').next()?.trim().parse().ok()
    }

    fn parse_value(&self, line: &str) -> Option<String> {
        line.split('\t').nth(1).map(|v| v.trim().to_string())
    }
}

#[test]
#[serial]
fn test_comment_lines_do_not_break_indexing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dec.txt.gz");

    let mut lines = Vec::new();
    for i in 0..200u64 {
        if i % 10 == 0 {
            lines.push(format!("# block {i}"));
        }
        lines.push(format!("{i}\tvalue-{i}"));
    }
    write_gz(&path, &lines);

    let table = IndexedGzipTable::open(&path, DecimalFormat);
    assert_eq!(table.lookup(0).as_deref(), Some("value-0"));
    assert_eq!(table.lookup(55).as_deref(), Some("value-55"));
    assert_eq!(table.lookup(199).as_deref(), Some("value-199"));
}
