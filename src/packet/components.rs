// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Component structs attached to frames by the standard pipeline stages.

use crate::models::{dot11::eapol::EapolFrame, mac::MacAddr};

/// Link-layer chunk: where in the frame buffer the layer-2 payload starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkChunk {
    pub dlt: u32,
    pub offset: usize,
    pub length: usize,
}

/// Decapsulated chunk produced by the LLC/decrypt stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecapChunk {
    pub offset: usize,
    pub length: usize,
    pub ethertype: u16,
}

/// Radio-layer observations supplied by the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct L1Radio {
    pub signal_dbm: i8,
    pub noise_dbm: i8,
    pub freq_mhz: u16,
    pub datarate_500kbps: u16,
    pub tsf_timer: u64,
}

/// Phy-independent summary written by classifiers for the common tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonInfo {
    pub phy_id: u32,
    pub source: MacAddr,
    pub dest: MacAddr,
    pub network: MacAddr,
    pub channel: String,
    pub freq_mhz: u16,
}

/// GPS fix associated with the frame at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub speed: f64,
    /// 0 none, 2 = 2d, 3 = 3d.
    pub fix: u8,
    pub ts_us: u64,
}

/// FCS/checksum validation state for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    pub checksum: u32,
    pub valid: bool,
}

/// Output of the data dissection stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    Eapol(EapolFrame),
    /// Recognized but untracked protocol, kept for logging.
    Other { ethertype: u16 },
}

/// Well-known component names; stages intern these through the chain at
/// startup so ids stay stable for the process lifetime.
pub mod names {
    pub const LINK_CHUNK: &str = "packet.chunk.link";
    pub const DECAP_CHUNK: &str = "packet.chunk.decap";
    pub const L1_RADIO: &str = "packet.l1.radio";
    pub const COMMON_INFO: &str = "packet.common";
    pub const GPS_FIX: &str = "packet.gps";
    pub const CHECKSUM: &str = "packet.checksum";
    pub const DATA_PAYLOAD: &str = "packet.data";
    pub const DOT11_INFO: &str = "phy80211.packinfo";
}
