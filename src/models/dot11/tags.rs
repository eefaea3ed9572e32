// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Small fixed-shape IE parsers: SSID, rates, channel, power, supported
//! channels, QBSS load, mobility domain.
//!
//! Every parser takes the tag body and returns a typed struct or an
//! [`IeError`]; none of them log or abort the classification of the frame
//! they came from.

use crate::{
    models::dot11::ie::{
        IE_DS_PARAM, IE_MOBILITY_DOMAIN, IE_POWER_CAPABILITY, IE_QBSS,
        IE_SUPPORTED_CHANNELS, IeError,
    },
    utils::munge_to_printable,
};

/// SSID tag: raw bytes (may contain nulls) plus the sanitized display form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SsidIe {
    pub raw: Vec<u8>,
    pub printable: String,
}

pub fn parse_ssid(data: &[u8]) -> Result<SsidIe, IeError> {
    if data.len() > 32 {
        // Oversize SSIDs are kept (the classifier alerts on them) but
        // clamped to the protocol maximum for the record.
        return Ok(SsidIe {
            raw: data.to_vec(),
            printable: munge_to_printable(&data[..32]),
        });
    }

    Ok(SsidIe { raw: data.to_vec(), printable: munge_to_printable(data) })
}

/// Supported/extended rates; values are in 500 kbps units with the basic
/// rate bit masked off.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RatesIe {
    pub rates_500kbps: Vec<u8>,
}

impl RatesIe {
    /// Highest advertised rate in Mbit/s.
    pub fn max_rate_mbps(&self) -> f64 {
        self.rates_500kbps
            .iter()
            .map(|r| *r as f64 / 2.0)
            .fold(0.0, f64::max)
    }
}

pub fn parse_rates(data: &[u8]) -> Result<RatesIe, IeError> {
    Ok(RatesIe {
        rates_500kbps: data.iter().map(|r| r & 0x7f).collect(),
    })
}

/// DS parameter set: the advertised primary channel.
pub fn parse_ds_channel(data: &[u8]) -> Result<u8, IeError> {
    if data.is_empty() {
        return Err(IeError::Short { number: IE_DS_PARAM, got: 0 });
    }
    Ok(data[0])
}

/// Power capability (IE 33): min/max transmit power in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerCapabilityIe {
    pub min_power_dbm: i8,
    pub max_power_dbm: i8,
}

pub fn parse_power_capability(data: &[u8]) -> Result<PowerCapabilityIe, IeError> {
    if data.len() < 2 {
        return Err(IeError::Short { number: IE_POWER_CAPABILITY, got: data.len() });
    }

    Ok(PowerCapabilityIe {
        min_power_dbm: data[0] as i8,
        max_power_dbm: data[1] as i8,
    })
}

/// Supported channels (IE 36): pairs of (first channel, count), expanded to
/// the full channel list. Each pair enumerates `start..start+count`.
pub fn parse_supported_channels(data: &[u8]) -> Result<Vec<u8>, IeError> {
    if data.len() % 2 != 0 {
        return Err(IeError::Malformed {
            number: IE_SUPPORTED_CHANNELS,
            reason: format!("odd body length {}", data.len()),
        });
    }

    let mut channels = Vec::new();

    for pair in data.chunks_exact(2) {
        let start = pair[0] as u32;
        let count = pair[1] as u32;

        if start + count > 0xff {
            return Err(IeError::Malformed {
                number: IE_SUPPORTED_CHANNELS,
                reason: format!("start {start} + count {count} > 255"),
            });
        }

        for i in 0..count {
            channels.push((start + i) as u8);
        }
    }

    Ok(channels)
}

/// 802.11e QBSS load element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QbssIe {
    pub station_count: u16,
    /// Channel utilization, fraction of 255.
    pub channel_utilization: u8,
    /// Remaining admission capacity in 32 µs/s units.
    pub available_capacity: u16,
}

pub fn parse_qbss(data: &[u8]) -> Result<QbssIe, IeError> {
    if data.len() < 5 {
        return Err(IeError::Short { number: IE_QBSS, got: data.len() });
    }

    Ok(QbssIe {
        station_count: u16::from_le_bytes([data[0], data[1]]),
        channel_utilization: data[2],
        available_capacity: u16::from_le_bytes([data[3], data[4]]),
    })
}

/// 802.11r mobility domain element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MobilityDomainIe {
    pub mobility_domain: u16,
    pub over_ds: bool,
    pub resource_request_capability: bool,
}

pub fn parse_mobility_domain(data: &[u8]) -> Result<MobilityDomainIe, IeError> {
    if data.len() < 3 {
        return Err(IeError::Short { number: IE_MOBILITY_DOMAIN, got: data.len() });
    }

    Ok(MobilityDomainIe {
        mobility_domain: u16::from_le_bytes([data[0], data[1]]),
        over_ds: data[2] & 0x01 != 0,
        resource_request_capability: data[2] & 0x02 != 0,
    })
}
