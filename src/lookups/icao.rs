// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! ADS-B ICAO registration lookups.
//!
//! Table lines are tab-separated: hex ICAO, registration, aircraft type
//! name, model, owner. Only the fields the UI consumes are retained.

use std::path::Path;

use serde::Serialize;

use crate::lookups::indexed::{IndexedGzipTable, LineFormat};

/// Resolved registration record, stored pipe-joined in the shared table
/// cache and split on access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcaoRecord {
    pub icao: u32,
    pub registration: String,
    pub atype: String,
    pub model: String,
    pub owner: String,
}

pub struct IcaoFormat;

impl LineFormat for IcaoFormat {
    fn parse_key(&self, line: &str) -> Option<u64> {
        let first = line.split('\t').next()?;
        u64::from_str_radix(first.trim().trim_matches('"'), 16).ok()
    }

    fn parse_value(&self, line: &str) -> Option<String> {
        let mut fields = line
            .split('\t')
            .map(|f| f.trim().trim_matches('"').to_string());

        let _icao = fields.next()?;
        let registration = fields.next().unwrap_or_default();
        let atype = fields.next().unwrap_or_default();
        let model = fields.next().unwrap_or_default();
        let owner = fields.next().unwrap_or_default();

        Some(format!("{registration}|{atype}|{model}|{owner}"))
    }
}

pub struct IcaoTracker {
    table: IndexedGzipTable<IcaoFormat>,
}

impl IcaoTracker {
    pub fn open(path: &Path) -> Self {
        Self { table: IndexedGzipTable::open(path, IcaoFormat) }
    }

    pub fn disabled() -> Self {
        Self { table: IndexedGzipTable::disabled(IcaoFormat) }
    }

    pub fn lookup(&self, icao: u32) -> Option<IcaoRecord> {
        let packed = self.table.lookup(icao as u64)?;
        let mut fields = packed.split('|').map(str::to_string);

        Some(IcaoRecord {
            icao,
            registration: fields.next().unwrap_or_default(),
            atype: fields.next().unwrap_or_default(),
            model: fields.next().unwrap_or_default(),
            owner: fields.next().unwrap_or_default(),
        })
    }
}
