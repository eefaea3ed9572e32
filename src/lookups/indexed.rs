// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sparse-indexed gzip table reader.
//!
//! The reference tables (OUI, ICAO registrations, Bluetooth ids) are large
//! sorted text files, one record per line, distributed gzipped. Rather than
//! hold them decompressed in memory, every Nth line's decompressed offset
//! and key goes into a sparse index; a lookup seeks to the nearest index
//! point below the key and scans forward. Hits and misses both land in a
//! cache so repeated queries never touch the file.
//!
//! The gzip cursor cannot be shared, so one mutex covers both the file
//! scan and the cache; lookups serialize.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use tracing::{info, warn};

/// Parses table lines into (key, value). Keys must be numeric and the file
/// sorted ascending by key.
pub trait LineFormat: Send + Sync {
    fn parse_key(&self, line: &str) -> Option<u64>;
    fn parse_value(&self, line: &str) -> Option<String>;
}

struct IndexPos {
    key: u64,
    /// Offset in decompressed bytes of the line start.
    offset: u64,
}

struct TableState {
    index: Vec<IndexPos>,
    cache: HashMap<u64, Option<String>>,
}

/// One indexed gzip table. Construction indexes the file; a missing or
/// unreadable file yields a table that answers every lookup with `None`.
pub struct IndexedGzipTable<F: LineFormat> {
    path: Option<PathBuf>,
    format: F,
    state: Mutex<TableState>,
    index_stride: usize,
}

impl<F: LineFormat> IndexedGzipTable<F> {
    pub fn open(path: &Path, format: F) -> Self {
        let mut table = Self {
            path: Some(path.to_path_buf()),
            format,
            state: Mutex::new(TableState { index: Vec::new(), cache: HashMap::new() }),
            index_stride: 50,
        };

        if let Err(e) = table.build_index() {
            warn!(path = ?path, error = %e, "could not index lookup table");
            table.path = None;
        }

        table
    }

    /// A table that never resolves; used when no file is configured.
    pub fn disabled(format: F) -> Self {
        Self {
            path: None,
            format,
            state: Mutex::new(TableState { index: Vec::new(), cache: HashMap::new() }),
            index_stride: 50,
        }
    }

    fn reader(path: &Path) -> Result<BufReader<MultiGzDecoder<File>>> {
        let f = File::open(path)
            .with_context(|| format!("opening lookup table {path:?}"))?;
        Ok(BufReader::new(MultiGzDecoder::new(f)))
    }

    fn build_index(&mut self) -> Result<()> {
        let path = self.path.clone().context("no table path")?;
        let mut reader = Self::reader(&path)?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut offset = 0u64;
        let mut line = String::new();
        let mut lineno = 0usize;
        let mut last_key = 0u64;

        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }

            if lineno % self.index_stride == 0 {
                if let Some(key) = self.format.parse_key(&line) {
                    if key < last_key {
                        warn!(
                            path = ?path,
                            "lookup table appears unsorted; results will be wrong"
                        );
                    }
                    last_key = key;
                    state.index.push(IndexPos { key, offset });
                } else {
                    // Probably a comment; retry the next line at this slot.
                    lineno = lineno.wrapping_sub(1);
                }
            }

            offset += n as u64;
            lineno += 1;
        }

        info!(
            path = ?path,
            lines = lineno,
            indexes = state.index.len(),
            "indexed lookup table"
        );

        Ok(())
    }

    /// Resolves a key. Misses are cached negatively so repeated lookups of
    /// unknown keys stay cheap.
    pub fn lookup(&self, key: u64) -> Option<String> {
        let path = self.path.as_ref()?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = state.cache.get(&key) {
            return cached.clone();
        }

        // Last index point at or below the key, backed off one slot to stay
        // inclusive of records between index lines.
        let slot = state.index.partition_point(|ip| ip.key <= key);
        if slot == 0 {
            state.cache.insert(key, None);
            return None;
        }
        let start = state.index[slot.saturating_sub(2)].offset;

        let found = self.scan_from(path, start, key).unwrap_or_else(|e| {
            warn!(error = %e, "lookup table scan failed");
            None
        });

        state.cache.insert(key, found.clone());
        found
    }

    fn scan_from(&self, path: &Path, start: u64, key: u64) -> Result<Option<String>> {
        let mut reader = Self::reader(path)?;

        // gzip offers no random access; skip decompressed bytes forward.
        std::io::copy(
            &mut reader.by_ref().take(start),
            &mut std::io::sink(),
        )?;

        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let Some(k) = self.format.parse_key(&line) else {
                continue;
            };

            if k == key {
                return Ok(self.format.parse_value(&line));
            }

            if k > key {
                return Ok(None);
            }
        }
    }

    /// Seeds the cache, used for config-supplied static entries.
    pub fn preload(&self, key: u64, value: String) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cache.insert(key, Some(value));
    }
}
