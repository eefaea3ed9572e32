// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 802.1X/EAPOL parsing: WPA 4-way handshake key frames and the WPS
//! registration messages riding EAP-Expanded.

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    big_endian::{U16, U64},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EapolError {
    #[error("truncated eapol frame: {0} bytes")]
    Truncated(usize),
    #[error("unsupported descriptor type {0}")]
    UnsupportedDescriptor(u8),
}

/// LLC SNAP header for 802.1X payloads.
const LLC_SNAP_8021X: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];

/// Strips an LLC/SNAP encapsulation, returning (ethertype, payload).
pub fn parse_llc_snap(body: &[u8]) -> Option<(u16, &[u8])> {
    if body.len() < 8 || body[0] != 0xaa || body[1] != 0xaa || body[2] != 0x03 {
        return None;
    }

    let ethertype = u16::from_be_bytes([body[6], body[7]]);
    Some((ethertype, &body[8..]))
}

/// True when a data-frame body is 802.1X.
pub fn is_eapol(body: &[u8]) -> bool {
    body.len() >= 8 && body[..8] == LLC_SNAP_8021X
}

const DOT1X_TYPE_EAP_PACKET: u8 = 0x00;
const DOT1X_TYPE_EAP_KEY: u8 = 0x03;

const KEY_DESCRIPTOR_RSN: u8 = 0x02;
const KEY_DESCRIPTOR_WPA: u8 = 0xfe;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawDot1x {
    version: u8,
    packet_type: u8,
    length: U16,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawEapolKey {
    descriptor_type: u8,
    key_info: U16,
    key_length: U16,
    replay_counter: U64,
    nonce: [u8; 32],
    key_iv: [u8; 16],
    key_rsc: [u8; 8],
    key_id: [u8; 8],
    mic: [u8; 16],
    key_data_length: U16,
}

/// Which end of the handshake sent the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeDirection {
    FromAp,
    FromClient,
}

/// One WPA 4-way handshake key frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolKey {
    /// 1..=4; 0 when the key-info bits match no handshake message.
    pub message_num: u8,
    pub direction: HandshakeDirection,
    pub replay_counter: u64,
    pub install: bool,
    pub nonce: [u8; 32],
    pub descriptor_version: u8,
}

impl EapolKey {
    pub fn nonce_is_zero(&self) -> bool {
        self.nonce.iter().all(|b| *b == 0)
    }
}

/// Parsed 802.1X payload variants the tracker cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapolFrame {
    Key(EapolKey),
    /// WPS registration protocol message (M1..M8 as 1..8).
    WpsMessage(u8),
}

/// Parses the 802.1X payload that followed an LLC 0x888E SNAP header.
pub fn parse_eapol(payload: &[u8]) -> Result<Option<EapolFrame>, EapolError> {
    let (hdr, rest) = RawDot1x::read_from_prefix(payload)
        .map_err(|_| EapolError::Truncated(payload.len()))?;

    match hdr.packet_type {
        DOT1X_TYPE_EAP_KEY => parse_key_frame(rest).map(Some),
        DOT1X_TYPE_EAP_PACKET => Ok(parse_eap_wps(rest)),
        _ => Ok(None),
    }
}

fn parse_key_frame(body: &[u8]) -> Result<EapolFrame, EapolError> {
    let (key, _) = RawEapolKey::read_from_prefix(body)
        .map_err(|_| EapolError::Truncated(body.len()))?;

    if key.descriptor_type != KEY_DESCRIPTOR_RSN
        && key.descriptor_type != KEY_DESCRIPTOR_WPA
    {
        return Err(EapolError::UnsupportedDescriptor(key.descriptor_type));
    }

    let info = key.key_info.get();

    let pairwise = info & 0x0008 != 0;
    let install = info & 0x0040 != 0;
    let ack = info & 0x0080 != 0;
    let mic = info & 0x0100 != 0;
    let secure = info & 0x0200 != 0;

    let message_num = if !pairwise {
        0
    } else if ack && !mic {
        1
    } else if ack && mic && install {
        3
    } else if !ack && mic && secure {
        4
    } else if !ack && mic {
        2
    } else {
        0
    };

    let direction = if ack {
        HandshakeDirection::FromAp
    } else {
        HandshakeDirection::FromClient
    };

    Ok(EapolFrame::Key(EapolKey {
        message_num,
        direction,
        replay_counter: key.replay_counter.get(),
        install,
        nonce: key.nonce,
        descriptor_version: (info & 0x0007) as u8,
    }))
}

const EAP_TYPE_EXPANDED: u8 = 0xfe;
const WFA_VENDOR_ID: u32 = 0x00372A;
const WFA_SIMPLECONFIG: u32 = 0x00000001;
const WPS_ATTR_MESSAGE_TYPE: u16 = 0x1022;

/// Extracts the WPS registration message number from an EAP-Expanded
/// SimpleConfig packet; anything else yields None.
fn parse_eap_wps(body: &[u8]) -> Option<EapolFrame> {
    // EAP header: code, id, length, type
    if body.len() < 12 || body[4] != EAP_TYPE_EXPANDED {
        return None;
    }

    let vendor =
        ((body[5] as u32) << 16) | ((body[6] as u32) << 8) | body[7] as u32;
    let vendor_type = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);

    if vendor != WFA_VENDOR_ID || vendor_type != WFA_SIMPLECONFIG {
        return None;
    }

    // opcode + flags precede the TLV stream
    let mut pos = 14;

    while pos + 4 <= body.len() {
        let attr = u16::from_be_bytes([body[pos], body[pos + 1]]);
        let len = u16::from_be_bytes([body[pos + 2], body[pos + 3]]) as usize;
        pos += 4;

        if pos + len > body.len() {
            return None;
        }

        if attr == WPS_ATTR_MESSAGE_TYPE && len >= 1 {
            // Wire values: M1=0x04 .. M8=0x0c with WSC_ACK/NACK interleaved.
            let m = match body[pos] {
                0x04 => 1,
                0x05 => 2,
                0x07 => 3,
                0x08 => 4,
                0x09 => 5,
                0x0a => 6,
                0x0b => 7,
                0x0c => 8,
                _ => return None,
            };
            return Some(EapolFrame::WpsMessage(m));
        }

        pos += len;
    }

    None
}
