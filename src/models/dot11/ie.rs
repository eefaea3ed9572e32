// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Information-element walker for management frame bodies.

use thiserror::Error;

use crate::utils::Adler32;

/// Tag numbers handled by leaf parsers; everything else is carried raw.
pub const IE_SSID: u8 = 0;
pub const IE_SUPPORTED_RATES: u8 = 1;
pub const IE_DS_PARAM: u8 = 3;
pub const IE_COUNTRY: u8 = 7;
pub const IE_QBSS: u8 = 11;
pub const IE_POWER_CAPABILITY: u8 = 33;
pub const IE_SUPPORTED_CHANNELS: u8 = 36;
pub const IE_RSN: u8 = 48;
pub const IE_EXT_RATES: u8 = 50;
pub const IE_MOBILITY_DOMAIN: u8 = 54;
pub const IE_HT_OPERATION: u8 = 61;
pub const IE_VHT_OPERATION: u8 = 192;
pub const IE_VENDOR: u8 = 221;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IeError {
    #[error("IE {number} length {length} overruns the body ({remaining} bytes left)")]
    Overrun { number: u8, length: u8, remaining: usize },
    #[error("IE {number} body too short: {got} bytes")]
    Short { number: u8, got: usize },
    #[error("IE {number} malformed: {reason}")]
    Malformed { number: u8, reason: String },
}

/// One decoded TLV, borrowing the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeTag<'a> {
    pub number: u8,
    pub data: &'a [u8],
}

impl IeTag<'_> {
    /// Vendor OUI for tag 221, if the body is long enough to hold one.
    pub fn vendor_oui(&self) -> Option<u32> {
        if self.number != IE_VENDOR || self.data.len() < 4 {
            return None;
        }
        Some(
            ((self.data[0] as u32) << 16)
                | ((self.data[1] as u32) << 8)
                | self.data[2] as u32,
        )
    }

    pub fn vendor_subtype(&self) -> Option<u8> {
        if self.number != IE_VENDOR || self.data.len() < 4 {
            return None;
        }
        Some(self.data[3])
    }
}

/// One entry of the IE ordering list used for device fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeOrderEntry {
    pub number: u8,
    pub vendor_oui: u32,
    pub vendor_subtype: u8,
}

/// Result of a full tag walk.
#[derive(Debug, Default)]
pub struct IeWalk<'a> {
    pub tags: Vec<IeTag<'a>>,
    /// Ordered (ie, oui, subtype) triples, vendor fields zero for non-221.
    pub order: Vec<IeOrderEntry>,
    /// Adler32 over the exact tag-number-and-length byte stream.
    pub tag_csum: u32,
    /// Set when the body ended inside a tag; tags up to that point are kept.
    pub truncated: bool,
}

/// Walks the TLV list. A tag whose declared length overruns the remaining
/// body terminates the walk with `truncated` set; prior tags stay valid.
pub fn walk_ies(body: &[u8]) -> IeWalk<'_> {
    let mut walk = IeWalk::default();
    let mut csum = Adler32::new();
    let mut pos = 0usize;

    while pos + 2 <= body.len() {
        let number = body[pos];
        let length = body[pos + 1] as usize;

        if pos + 2 + length > body.len() {
            walk.truncated = true;
            break;
        }

        let data = &body[pos + 2..pos + 2 + length];
        csum.update(&[number, length as u8]);

        let tag = IeTag { number, data };
        walk.order.push(IeOrderEntry {
            number,
            vendor_oui: tag.vendor_oui().unwrap_or(0),
            vendor_subtype: tag.vendor_subtype().unwrap_or(0),
        });
        walk.tags.push(tag);

        pos += 2 + length;
    }

    if pos < body.len() && pos + 2 > body.len() {
        // Trailing byte that cannot form a tag header.
        walk.truncated = true;
    }

    walk.tag_csum = csum.finalize();
    walk
}
