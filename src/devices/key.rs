// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{models::mac::MacAddr, utils::adler32};

/// Stable hash of a phy name; device keys embed it so keys survive
/// restarts and phy registration order changes.
pub fn phy_hash(name: &str) -> u32 {
    adler32(name.as_bytes())
}

#[derive(Debug, Error)]
#[error("invalid device key: {0}")]
pub struct InvalidDeviceKey(pub String);

/// Canonical device identity: (phy hash, MAC). Everything external keys by
/// this; the tracker's internal ids never leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub phy: u32,
    pub mac: MacAddr,
}

impl DeviceKey {
    pub fn new(phy: u32, mac: MacAddr) -> Self {
        Self { phy, mac }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}_{}",
            self.phy,
            self.mac.to_string().replace(':', "")
        )
    }
}

impl FromStr for DeviceKey {
    type Err = InvalidDeviceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (phy_part, mac_part) =
            s.split_once('_').ok_or_else(|| InvalidDeviceKey(s.to_string()))?;

        let phy = u32::from_str_radix(phy_part, 16)
            .map_err(|_| InvalidDeviceKey(s.to_string()))?;

        if mac_part.len() != 12 {
            return Err(InvalidDeviceKey(s.to_string()));
        }

        let mut mac = [0u8; 6];
        for (i, b) in mac.iter_mut().enumerate() {
            *b = u8::from_str_radix(&mac_part[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidDeviceKey(s.to_string()))?;
        }

        Ok(Self { phy, mac: MacAddr(mac) })
    }
}
