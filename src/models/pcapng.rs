// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Minimal pcap-NG block writer.
//!
//! Produces section header, interface description, and enhanced packet
//! blocks with microsecond timestamps. Blocks are built as byte vectors so
//! the same encoder feeds file sinks and chunked HTTP streams.

use std::collections::HashMap;

pub const BLOCK_SHB: u32 = 0x0A0D_0D0A;
pub const BLOCK_IDB: u32 = 0x0000_0001;
pub const BLOCK_EPB: u32 = 0x0000_0006;

const SHB_MAGIC: u32 = 0x1A2B_3C4D;

fn pad4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

fn finish_block(mut body: Vec<u8>) -> Vec<u8> {
    // total length covers the length words themselves
    let total = (body.len() + 8) as u32;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&body[..4]); // block type already first
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body.split_off(4).as_slice());
    out.extend_from_slice(&total.to_le_bytes());
    out
}

/// Section header block opening a capture section of unknown length.
pub fn shb_block(app_name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&BLOCK_SHB.to_le_bytes());
    body.extend_from_slice(&SHB_MAGIC.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes()); // major
    body.extend_from_slice(&0u16.to_le_bytes()); // minor
    body.extend_from_slice(&(-1i64).to_le_bytes()); // section length unknown

    // opt_shb_userappl (4)
    let name = app_name.as_bytes();
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&(name.len() as u16).to_le_bytes());
    body.extend_from_slice(name);
    body.extend_from_slice(&vec![0u8; pad4(name.len())]);
    // opt_endofopt
    body.extend_from_slice(&0u32.to_le_bytes());

    finish_block(body)
}

/// Interface description block.
pub fn idb_block(dlt: u32, name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&BLOCK_IDB.to_le_bytes());
    body.extend_from_slice(&(dlt as u16).to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes()); // reserved
    body.extend_from_slice(&0u32.to_le_bytes()); // snaplen unlimited

    // opt_if_name (2)
    let n = name.as_bytes();
    body.extend_from_slice(&2u16.to_le_bytes());
    body.extend_from_slice(&(n.len() as u16).to_le_bytes());
    body.extend_from_slice(n);
    body.extend_from_slice(&vec![0u8; pad4(n.len())]);
    body.extend_from_slice(&0u32.to_le_bytes());

    finish_block(body)
}

/// Enhanced packet block; `ts_us` is microseconds since the epoch, matching
/// the default if_tsresol.
pub fn epb_block(interface_id: u32, ts_us: u64, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&BLOCK_EPB.to_le_bytes());
    body.extend_from_slice(&interface_id.to_le_bytes());
    body.extend_from_slice(&((ts_us >> 32) as u32).to_le_bytes());
    body.extend_from_slice(&(ts_us as u32).to_le_bytes());
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(&vec![0u8; pad4(data.len())]);
    body.extend_from_slice(&0u32.to_le_bytes());

    finish_block(body)
}

/// Incremental pcap-NG encoder multiplexing any number of interfaces into
/// one section. Interfaces are created on first use, keyed by caller id.
#[derive(Default)]
pub struct PcapngEncoder {
    ifaces: HashMap<String, u32>,
    started: bool,
}

impl PcapngEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits the section header immediately so a sink is a valid capture
    /// before the first packet arrives.
    pub fn start(&mut self) -> Vec<u8> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        shb_block("wlan-sentry")
    }

    /// Emits the section header once, then an IDB if this interface key is
    /// new, then the packet block.
    pub fn encode_packet(
        &mut self,
        iface_key: &str,
        dlt: u32,
        ts_us: u64,
        data: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();

        if !self.started {
            out.extend_from_slice(&shb_block("wlan-sentry"));
            self.started = true;
        }

        let next_id = self.ifaces.len() as u32;
        let id = match self.ifaces.get(iface_key) {
            Some(id) => *id,
            None => {
                self.ifaces.insert(iface_key.to_string(), next_id);
                out.extend_from_slice(&idb_block(dlt, iface_key));
                next_id
            },
        };

        out.extend_from_slice(&epb_block(id, ts_us, data));
        out
    }
}
