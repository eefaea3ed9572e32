// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RSN element (tag 48) and the crypt-set bitfield summarizing the
//! cipher/AKM combinations a network advertises.

use bitflags::bitflags;

use crate::models::dot11::ie::{IE_RSN, IeError};

bitflags! {
    /// Union of observed cipher suites, key-management suites, and
    /// management-frame-protection bits for a BSS.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CryptSet: u64 {
        const WEP            = 1 << 0;
        const TKIP           = 1 << 1;
        const CCMP           = 1 << 2;
        const GCMP           = 1 << 3;
        const BIP_CMAC       = 1 << 4;

        const AKM_8021X      = 1 << 8;
        const AKM_PSK        = 1 << 9;
        const AKM_FT_8021X   = 1 << 10;
        const AKM_FT_PSK     = 1 << 11;
        const AKM_SAE        = 1 << 12;
        const AKM_OWE        = 1 << 13;

        const VERSION_WPA1   = 1 << 16;
        const VERSION_WPA2   = 1 << 17;
        const VERSION_WPA3   = 1 << 18;

        const MFP_SUPPORTED  = 1 << 24;
        const MFP_REQUIRED   = 1 << 25;

        const WPS            = 1 << 26;
    }
}

const RSN_OUI: u32 = 0x000FAC;

/// Cipher suite selector: OUI plus one suite byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suite {
    pub oui: u32,
    pub suite_type: u8,
}

impl Suite {
    fn read(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        Some(Suite {
            oui: ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32,
            suite_type: data[3],
        })
    }

    /// Standard RSN cipher suite → crypt bit.
    pub fn cipher_bits(&self) -> CryptSet {
        if self.oui != RSN_OUI {
            return CryptSet::empty();
        }
        match self.suite_type {
            1 | 5 => CryptSet::WEP,
            2 => CryptSet::TKIP,
            4 => CryptSet::CCMP,
            6 => CryptSet::BIP_CMAC,
            8 | 9 => CryptSet::GCMP,
            _ => CryptSet::empty(),
        }
    }

    /// Standard RSN AKM suite → crypt bit, including the WPA3 marker for
    /// SAE/OWE key management.
    pub fn akm_bits(&self) -> CryptSet {
        if self.oui != RSN_OUI {
            return CryptSet::empty();
        }
        match self.suite_type {
            1 | 5 => CryptSet::AKM_8021X,
            2 | 6 => CryptSet::AKM_PSK,
            3 => CryptSet::AKM_FT_8021X,
            4 => CryptSet::AKM_FT_PSK,
            8 => CryptSet::AKM_SAE | CryptSet::VERSION_WPA3,
            18 => CryptSet::AKM_OWE | CryptSet::VERSION_WPA3,
            _ => CryptSet::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RsnIe {
    pub version: u16,
    pub group_cipher: Option<Suite>,
    pub pairwise_ciphers: Vec<Suite>,
    pub akm_suites: Vec<Suite>,
    pub rsn_capabilities: u16,
}

impl RsnIe {
    pub fn mfp_required(&self) -> bool {
        self.rsn_capabilities & 0x0040 != 0
    }

    pub fn mfp_supported(&self) -> bool {
        self.rsn_capabilities & 0x0080 != 0
    }

    /// Folds the element into the crypt-set union.
    pub fn crypt_set(&self) -> CryptSet {
        let mut set = CryptSet::VERSION_WPA2;

        if let Some(group) = &self.group_cipher {
            set |= group.cipher_bits();
        }
        for c in &self.pairwise_ciphers {
            set |= c.cipher_bits();
        }
        for a in &self.akm_suites {
            set |= a.akm_bits();
        }

        if self.mfp_required() {
            set |= CryptSet::MFP_REQUIRED | CryptSet::MFP_SUPPORTED;
        } else if self.mfp_supported() {
            set |= CryptSet::MFP_SUPPORTED;
        }

        set
    }
}

pub fn parse_rsn(data: &[u8]) -> Result<RsnIe, IeError> {
    let short = |got| IeError::Short { number: IE_RSN, got };

    if data.len() < 2 {
        return Err(short(data.len()));
    }

    let version = u16::from_le_bytes([data[0], data[1]]);
    let mut pos = 2;

    let mut ie = RsnIe { version, ..Default::default() };

    // Everything after the version is optional; an RSN element may legally
    // end after any complete field.
    if data.len() < pos + 4 {
        return Ok(ie);
    }
    ie.group_cipher = Suite::read(&data[pos..]);
    pos += 4;

    if data.len() < pos + 2 {
        return Ok(ie);
    }
    let pairwise_count = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
    pos += 2;

    if data.len() < pos + pairwise_count * 4 {
        return Err(short(data.len()));
    }
    for _ in 0..pairwise_count {
        if let Some(s) = Suite::read(&data[pos..]) {
            ie.pairwise_ciphers.push(s);
        }
        pos += 4;
    }

    if data.len() < pos + 2 {
        return Ok(ie);
    }
    let akm_count = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
    pos += 2;

    if data.len() < pos + akm_count * 4 {
        return Err(short(data.len()));
    }
    for _ in 0..akm_count {
        if let Some(s) = Suite::read(&data[pos..]) {
            ie.akm_suites.push(s);
        }
        pos += 4;
    }

    if data.len() >= pos + 2 {
        ie.rsn_capabilities = u16::from_le_bytes([data[pos], data[pos + 1]]);
    }

    Ok(ie)
}
