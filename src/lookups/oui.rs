// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Manufacturer resolution from the OUI table.
//!
//! Table lines look like `AA:BB:CC<tab>Vendor Name`. Config-file `manuf=`
//! entries seed the cache ahead of the file; randomized (locally
//! administered) addresses resolve without touching the table at all.

use std::{path::Path, sync::Arc};

use tracing::{info, warn};

use crate::{
    cfg::config::ConfigFile,
    lookups::indexed::{IndexedGzipTable, LineFormat},
    models::mac::MacAddr,
    utils::munge_to_printable,
};

pub struct OuiFormat;

impl LineFormat for OuiFormat {
    fn parse_key(&self, line: &str) -> Option<u64> {
        let mut parts = line.split(':');
        let a = u64::from_str_radix(parts.next()?.trim(), 16).ok()?;
        let b = u64::from_str_radix(parts.next()?.trim(), 16).ok()?;
        let c_field = parts.next()?;
        let c = u64::from_str_radix(
            c_field.split_whitespace().next()?.trim(),
            16,
        )
        .ok()?;
        Some((a << 16) | (b << 8) | c)
    }

    fn parse_value(&self, line: &str) -> Option<String> {
        let (_, rest) = line.split_once('\t')?;
        let name = rest.trim();
        if name.is_empty() {
            return None;
        }
        Some(munge_to_printable(name.as_bytes()))
    }
}

pub struct OuiTracker {
    table: IndexedGzipTable<OuiFormat>,
    unknown: Arc<str>,
    randomized: Arc<str>,
}

impl OuiTracker {
    /// Builds the tracker from config: `manuf_lookup` gates the file,
    /// `ouifile` names candidates (first readable wins), `manuf=` entries
    /// override individual OUIs.
    pub fn from_config(config: &ConfigFile) -> Self {
        let tracker = if !config.fetch_opt_bool("manuf_lookup", true) {
            info!("disabling OUI lookup");
            Self::disabled()
        } else {
            let mut table = None;

            for candidate in config.fetch_opt_vec("ouifile") {
                let path = Path::new(&candidate);
                if path.exists() {
                    info!(path = %candidate, "opened OUI file");
                    table = Some(IndexedGzipTable::open(path, OuiFormat));
                    break;
                }
                warn!(path = %candidate, "could not open OUI file");
            }

            match table {
                Some(t) => Self::with_table(t),
                None => {
                    warn!(
                        "no OUI files available, will not resolve manufacturer \
                         names for MAC addresses"
                    );
                    Self::disabled()
                },
            }
        };

        for m in config.fetch_opt_vec("manuf") {
            let Some((mac, name)) = m.split_once(',') else {
                warn!(entry = %m, "expected 'manuf=AA:BB:CC,Name'");
                continue;
            };
            let Ok(parsed) = format!("{}:00:00:00", mac.trim()).parse::<MacAddr>()
            else {
                warn!(entry = %m, "expected 'manuf=AA:BB:CC,Name'");
                continue;
            };
            tracker
                .table
                .preload(parsed.oui() as u64, name.trim().to_string());
        }

        tracker
    }

    fn with_table(table: IndexedGzipTable<OuiFormat>) -> Self {
        Self {
            table,
            unknown: Arc::from("Unknown"),
            randomized: Arc::from("Randomized"),
        }
    }

    pub fn disabled() -> Self {
        Self::with_table(IndexedGzipTable::disabled(OuiFormat))
    }

    pub fn unknown(&self) -> Arc<str> {
        Arc::clone(&self.unknown)
    }

    /// Resolves a manufacturer name for a MAC.
    pub fn lookup(&self, mac: MacAddr) -> Arc<str> {
        if mac.is_locally_administered() {
            return Arc::clone(&self.randomized);
        }

        match self.table.lookup(mac.oui() as u64) {
            Some(name) => Arc::from(name.as_str()),
            None => Arc::clone(&self.unknown),
        }
    }
}
