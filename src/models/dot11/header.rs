// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 802.11 MAC header decoding.
//!
//! The header layout is fixed for the first 24 bytes (30 for WDS frames with
//! a fourth address); everything after depends on type/subtype. Decoding
//! fails only on truncation — malformed bodies are the concern of the tag
//! parsers, which flag errors per tag.

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{U16, U64},
};

use crate::models::mac::MacAddr;

/// Returned when a frame is shorter than its mandatory header.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("truncated 802.11 frame: needed {needed} bytes, got {got}")]
pub struct Truncated {
    pub needed: usize,
    pub got: usize,
}

/// Frame control: type field (2 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Extension,
}

/// Management subtypes we classify; the rest stay raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtSubtype {
    AssocReq,
    AssocResp,
    ReassocReq,
    ReassocResp,
    ProbeReq,
    ProbeResp,
    Beacon,
    Atim,
    Disassoc,
    Auth,
    Deauth,
    Action,
    Other(u8),
}

impl MgmtSubtype {
    pub fn from_raw(v: u8) -> Self {
        match v {
            0 => Self::AssocReq,
            1 => Self::AssocResp,
            2 => Self::ReassocReq,
            3 => Self::ReassocResp,
            4 => Self::ProbeReq,
            5 => Self::ProbeResp,
            8 => Self::Beacon,
            9 => Self::Atim,
            10 => Self::Disassoc,
            11 => Self::Auth,
            12 => Self::Deauth,
            13 => Self::Action,
            other => Self::Other(other),
        }
    }
}

/// Fixed 24-byte header prefix shared by management and data frames.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawHdr {
    frame_control: U16,
    duration: U16,
    addr1: MacAddr,
    addr2: MacAddr,
    addr3: MacAddr,
    seq_ctrl: U16,
}

const HDR_LEN: usize = 24;
const WDS_HDR_LEN: usize = 30;

/// Beacon / probe-response fixed parameters preceding the tagged IEs.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawBeaconFixed {
    timestamp: U64,
    beacon_interval: U16,
    capability: U16,
}

pub const BEACON_FIXED_LEN: usize = 12;

pub const CAP_ESS: u16 = 0x0001;
pub const CAP_IBSS: u16 = 0x0002;
pub const CAP_PRIVACY: u16 = 0x0010;

/// Decoded MAC header with DS-resolved addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dot11Header {
    pub frame_type: FrameType,
    pub subtype_raw: u8,
    pub duration: u16,
    pub to_ds: bool,
    pub from_ds: bool,
    pub more_fragments: bool,
    pub retry: bool,
    pub protected: bool,
    pub order: bool,
    pub sequence: u16,
    pub fragment: u8,
    /// Transmitter of the frame.
    pub source: MacAddr,
    /// Final destination.
    pub dest: MacAddr,
    /// BSS the frame belongs to; zero when unresolvable (WDS).
    pub bssid: MacAddr,
    /// Fourth address, present only when to-DS and from-DS are both set.
    pub transmitter: Option<MacAddr>,
    /// Offset of the type-specific body within the frame.
    pub body_offset: usize,
}

impl Dot11Header {
    pub fn mgmt_subtype(&self) -> Option<MgmtSubtype> {
        match self.frame_type {
            FrameType::Management => Some(MgmtSubtype::from_raw(self.subtype_raw)),
            _ => None,
        }
    }

    pub fn is_qos_data(&self) -> bool {
        self.frame_type == FrameType::Data && self.subtype_raw & 0x08 != 0
    }

    /// Null-function data frames carry no payload and usually signal
    /// power-save transitions.
    pub fn is_null_data(&self) -> bool {
        self.frame_type == FrameType::Data && (self.subtype_raw & 0x04) != 0
    }
}

pub fn decode_header(frame: &[u8]) -> Result<Dot11Header, Truncated> {
    let (raw, _) = RawHdr::read_from_prefix(frame).map_err(|_| Truncated {
        needed: HDR_LEN,
        got: frame.len(),
    })?;

    let fc = raw.frame_control.get();
    let ftype = match (fc >> 2) & 0x3 {
        0 => FrameType::Management,
        1 => FrameType::Control,
        2 => FrameType::Data,
        _ => FrameType::Extension,
    };
    let subtype_raw = ((fc >> 4) & 0xf) as u8;

    let to_ds = fc & 0x0100 != 0;
    let from_ds = fc & 0x0200 != 0;
    let more_fragments = fc & 0x0400 != 0;
    let retry = fc & 0x0800 != 0;
    let protected = fc & 0x4000 != 0;
    let order = fc & 0x8000 != 0;

    // Address meaning depends on the DS direction bits.
    let (source, dest, bssid, transmitter, mut body_offset) = match (to_ds, from_ds) {
        (false, false) => (raw.addr2, raw.addr1, raw.addr3, None, HDR_LEN),
        (false, true) => (raw.addr3, raw.addr1, raw.addr2, None, HDR_LEN),
        (true, false) => (raw.addr2, raw.addr3, raw.addr1, None, HDR_LEN),
        (true, true) => {
            if frame.len() < WDS_HDR_LEN {
                return Err(Truncated { needed: WDS_HDR_LEN, got: frame.len() });
            }
            let addr4 = MacAddr::from_slice(&frame[HDR_LEN..WDS_HDR_LEN])
                .map_err(|_| Truncated { needed: WDS_HDR_LEN, got: frame.len() })?;
            (addr4, raw.addr3, MacAddr::ZERO, Some(raw.addr2), WDS_HDR_LEN)
        },
    };

    // QoS data frames insert a 2-byte QoS control field.
    if ftype == FrameType::Data && subtype_raw & 0x08 != 0 {
        body_offset += 2;
        if frame.len() < body_offset {
            return Err(Truncated { needed: body_offset, got: frame.len() });
        }
    }

    let seq_ctrl = raw.seq_ctrl.get();

    Ok(Dot11Header {
        frame_type: ftype,
        subtype_raw,
        duration: raw.duration.get(),
        to_ds,
        from_ds,
        more_fragments,
        retry,
        protected,
        order,
        sequence: seq_ctrl >> 4,
        fragment: (seq_ctrl & 0xf) as u8,
        source,
        dest,
        bssid,
        transmitter,
        body_offset,
    })
}

/// Fixed beacon/probe-response parameters ahead of the IE list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconFixed {
    /// TSF timer in microseconds.
    pub timestamp: u64,
    /// Beacon interval in time units (1024 µs).
    pub beacon_interval: u16,
    pub capability: u16,
}

impl BeaconFixed {
    pub fn privacy(&self) -> bool {
        self.capability & CAP_PRIVACY != 0
    }

    pub fn ess(&self) -> bool {
        self.capability & CAP_ESS != 0
    }

    pub fn ibss(&self) -> bool {
        self.capability & CAP_IBSS != 0
    }

    /// Beacon rate in beacons per second, from the interval in time units.
    pub fn beacon_rate(&self) -> u32 {
        if self.beacon_interval == 0 {
            return 0;
        }
        (1_000_000u32 / 1024) / self.beacon_interval as u32
    }
}

pub fn decode_beacon_fixed(body: &[u8]) -> Result<BeaconFixed, Truncated> {
    let (raw, _) = RawBeaconFixed::read_from_prefix(body).map_err(|_| Truncated {
        needed: BEACON_FIXED_LEN,
        got: body.len(),
    })?;

    Ok(BeaconFixed {
        timestamp: raw.timestamp.get(),
        beacon_interval: raw.beacon_interval.get(),
        capability: raw.capability.get(),
    })
}
