// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 802.11d country information element (tag 7).

use crate::{
    models::dot11::ie::{IE_COUNTRY, IeError},
    utils::munge_to_printable,
};

/// One regulatory triplet: a run of channels and their power ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryTriplet {
    pub first_channel: u8,
    pub num_channels: u8,
    pub max_power_dbm: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountryIe {
    /// Two-character ISO country code, sanitized.
    pub country_code: String,
    /// Third environment byte: ' ' any, 'I' indoor, 'O' outdoor.
    pub environment: u8,
    pub triplets: Vec<CountryTriplet>,
}

impl CountryIe {
    /// True when `channel` falls inside any advertised run.
    pub fn allows_channel(&self, channel: u8) -> bool {
        self.triplets.iter().any(|t| {
            channel >= t.first_channel
                && (channel as u16) < t.first_channel as u16 + t.num_channels as u16
        })
    }
}

pub fn parse_country(data: &[u8]) -> Result<CountryIe, IeError> {
    if data.len() < 3 {
        return Err(IeError::Short { number: IE_COUNTRY, got: data.len() });
    }

    let country_code = munge_to_printable(&data[0..2]);
    let environment = data[2];

    let mut triplets = Vec::new();

    // Triplets follow in 3-byte groups; a trailing pad byte is tolerated.
    for group in data[3..].chunks(3) {
        if group.len() < 3 {
            break;
        }

        // Operating-class triplets (first byte >= 201) are not channel runs.
        if group[0] >= 201 {
            continue;
        }

        triplets.push(CountryTriplet {
            first_channel: group[0],
            num_channels: group[1],
            max_power_dbm: group[2] as i8,
        });
    }

    Ok(CountryIe { country_code, environment, triplets })
}
