// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Vendor-specific IE (tag 221) parsers: legacy WPA1, WPS, and DJI DroneID.

use crate::{
    models::dot11::{
        ie::{IE_VENDOR, IeError},
        rsn::{CryptSet, Suite},
    },
    utils::munge_to_printable,
};

pub const MICROSOFT_OUI: u32 = 0x0050F2;
pub const WPA1_SUBTYPE: u8 = 1;
pub const WPS_SUBTYPE: u8 = 4;
pub const DJI_OUI: u32 = 0x263712;

fn short(got: usize) -> IeError {
    IeError::Short { number: IE_VENDOR, got }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy WPA1 (Microsoft OUI, subtype 1)

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WpaIe {
    pub version: u16,
    pub multicast_cipher: Option<Suite>,
    pub unicast_ciphers: Vec<Suite>,
    pub akm_suites: Vec<Suite>,
}

impl WpaIe {
    /// WPA1 suites use the Microsoft OUI; map the suite bytes onto the same
    /// crypt bits as their RSN counterparts.
    pub fn crypt_set(&self) -> CryptSet {
        let mut set = CryptSet::VERSION_WPA1;

        let cipher = |s: &Suite| match s.suite_type {
            1 | 5 => CryptSet::WEP,
            2 => CryptSet::TKIP,
            4 => CryptSet::CCMP,
            _ => CryptSet::empty(),
        };
        let akm = |s: &Suite| match s.suite_type {
            1 => CryptSet::AKM_8021X,
            2 => CryptSet::AKM_PSK,
            _ => CryptSet::empty(),
        };

        if let Some(m) = &self.multicast_cipher {
            set |= cipher(m);
        }
        for c in &self.unicast_ciphers {
            set |= cipher(c);
        }
        for a in &self.akm_suites {
            set |= akm(a);
        }

        set
    }
}

/// Parses the WPA1 body following the `00:50:F2 / 01` vendor header.
pub fn parse_wpa(data: &[u8]) -> Result<WpaIe, IeError> {
    if data.len() < 2 {
        return Err(short(data.len()));
    }

    let mut ie = WpaIe {
        version: u16::from_le_bytes([data[0], data[1]]),
        ..Default::default()
    };
    let mut pos = 2;

    if data.len() < pos + 4 {
        return Ok(ie);
    }
    ie.multicast_cipher = suite_at(data, pos);
    pos += 4;

    if data.len() < pos + 2 {
        return Ok(ie);
    }
    let ucount = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
    pos += 2;

    if data.len() < pos + ucount * 4 {
        return Err(short(data.len()));
    }
    for _ in 0..ucount {
        if let Some(s) = suite_at(data, pos) {
            ie.unicast_ciphers.push(s);
        }
        pos += 4;
    }

    if data.len() < pos + 2 {
        return Ok(ie);
    }
    let acount = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
    pos += 2;

    if data.len() < pos + acount * 4 {
        return Err(short(data.len()));
    }
    for _ in 0..acount {
        if let Some(s) = suite_at(data, pos) {
            ie.akm_suites.push(s);
        }
        pos += 4;
    }

    Ok(ie)
}

fn suite_at(data: &[u8], pos: usize) -> Option<Suite> {
    let raw = data.get(pos..pos + 4)?;
    Some(Suite {
        oui: ((raw[0] as u32) << 16) | ((raw[1] as u32) << 8) | raw[2] as u32,
        suite_type: raw[3],
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// WPS (Microsoft OUI, subtype 4)

/// WPS attribute ids we surface.
const WPS_ATTR_STATE: u16 = 0x1044;
const WPS_ATTR_DEVICE_NAME: u16 = 0x1011;
const WPS_ATTR_MANUF: u16 = 0x1021;
const WPS_ATTR_MODEL_NAME: u16 = 0x1023;
const WPS_ATTR_MODEL_NUMBER: u16 = 0x1024;
const WPS_ATTR_UUID_E: u16 = 0x1047;
const WPS_ATTR_SETUP_LOCKED: u16 = 0x1057;
const WPS_ATTR_VERSION: u16 = 0x104A;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WpsIe {
    pub version: u8,
    /// 1 = not configured, 2 = configured.
    pub state: u8,
    pub setup_locked: bool,
    pub device_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: String,
    pub uuid_e: Vec<u8>,
}

/// Parses the big-endian TLV stream of a WPS beacon/probe element.
pub fn parse_wps(data: &[u8]) -> Result<WpsIe, IeError> {
    let mut ie = WpsIe::default();
    let mut pos = 0usize;

    while pos + 4 <= data.len() {
        let attr = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + len > data.len() {
            return Err(IeError::Malformed {
                number: IE_VENDOR,
                reason: format!("wps attribute 0x{attr:04x} overruns body"),
            });
        }

        let body = &data[pos..pos + len];
        pos += len;

        match attr {
            WPS_ATTR_VERSION if !body.is_empty() => ie.version = body[0],
            WPS_ATTR_STATE if !body.is_empty() => ie.state = body[0],
            WPS_ATTR_SETUP_LOCKED if !body.is_empty() => {
                ie.setup_locked = body[0] != 0
            },
            WPS_ATTR_DEVICE_NAME => ie.device_name = munge_to_printable(body),
            WPS_ATTR_MANUF => ie.manufacturer = munge_to_printable(body),
            WPS_ATTR_MODEL_NAME => ie.model_name = munge_to_printable(body),
            WPS_ATTR_MODEL_NUMBER => ie.model_number = munge_to_printable(body),
            WPS_ATTR_UUID_E => ie.uuid_e = body.to_vec(),
            _ => {},
        }
    }

    Ok(ie)
}

// ─────────────────────────────────────────────────────────────────────────────
// DJI DroneID (OUI 26:37:12)

/// Flight telemetry subcommand.
pub const DJI_SUBCOMMAND_FLIGHTREG: u8 = 0x10;
/// User-entered flight info subcommand.
pub const DJI_SUBCOMMAND_FLIGHTPURPOSE: u8 = 0x11;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DroneIdIe {
    pub vendor_type: u8,
    pub subcommand: u8,
    pub serial: String,
    /// Degrees; zero when the drone reports no fix.
    pub lat: f64,
    pub lon: f64,
    /// Meters.
    pub altitude: f64,
    pub motor_on: bool,
    pub in_air: bool,
}

/// Parses the DroneID telemetry payload following the vendor header. Only
/// the flightreg subcommand carries positional data.
pub fn parse_droneid(data: &[u8]) -> Result<DroneIdIe, IeError> {
    if data.len() < 4 {
        return Err(short(data.len()));
    }

    let mut ie = DroneIdIe {
        vendor_type: data[0],
        subcommand: data[3],
        ..Default::default()
    };

    if ie.subcommand != DJI_SUBCOMMAND_FLIGHTREG {
        return Ok(ie);
    }

    // flightreg layout after the 4-byte command block:
    // version u8, seq u16, state u16, serial [16], lon i32, lat i32,
    // altitude i16, ...
    let body = &data[4..];
    if body.len() < 33 {
        return Err(short(data.len()));
    }

    let state = u16::from_le_bytes([body[3], body[4]]);
    ie.motor_on = state & 0x0004 != 0;
    ie.in_air = state & 0x0008 != 0;

    ie.serial = munge_to_printable(&body[5..21])
        .trim_end_matches(['.', ' '])
        .to_string();

    let lon_raw = i32::from_le_bytes([body[21], body[22], body[23], body[24]]);
    let lat_raw = i32::from_le_bytes([body[25], body[26], body[27], body[28]]);

    // Fixed-point radians scaled by 174533.0, per the wire format.
    ie.lon = lon_raw as f64 / 174533.0 * 57.2957795786;
    ie.lat = lat_raw as f64 / 174533.0 * 57.2957795786;

    ie.altitude = i16::from_le_bytes([body[29], body[30]]) as f64 / 10.0;

    Ok(ie)
}
