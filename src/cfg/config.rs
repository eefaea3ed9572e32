// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Line-oriented `key=value` configuration store.
//!
//! Supported directives: `key=value`, `key+=value` (append), `#` comments,
//! `include=path` (recursive, mandatory), `opt_include=glob` (expanded,
//! silently skipped when absent), `opt_override=path` (parsed after the
//! parent file completes; replaces whole keys unless every override entry
//! appends). Keys are case-folded to lower.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::utils::adler32;

#[derive(Debug, Clone)]
pub struct ConfigEntity {
    pub value: String,
    pub source: String,
    pub append: bool,
}

/// Filesystem anchors consumed by `%`-expansion in log path templates.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub log_prefix: String,
    pub home_dir: String,
    pub data_dir: String,
    pub etc_dir: String,
    pub bin_dir: String,
}

#[derive(Default)]
struct ConfigState {
    map: HashMap<String, Vec<ConfigEntity>>,
    override_files: Vec<String>,
    checksum: u32,
}

pub struct ConfigFile {
    state: Mutex<ConfigState>,
    paths: Mutex<ConfigPaths>,
    /// Fixed at construction so every expanded path in a session agrees.
    start_time: DateTime<Utc>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFile {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConfigState::default()),
            paths: Mutex::new(ConfigPaths {
                home_dir: std::env::var("HOME").unwrap_or_else(|_| ".".into()),
                log_prefix: "./".into(),
                ..Default::default()
            }),
            start_time: Utc::now(),
        }
    }

    pub fn set_paths(&self, paths: ConfigPaths) {
        *self.paths.lock().unwrap_or_else(|e| e.into_inner()) = paths;
    }

    /// Parses the top-level config file, then any deferred override files.
    pub fn parse_config<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.parse_file(path.as_ref(), false)?;

        let overrides = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut state.override_files)
        };

        for f in overrides {
            self.parse_override(Path::new(&f))?;
        }

        self.recalculate_checksum();
        Ok(())
    }

    fn parse_file(&self, path: &Path, silent: bool) -> Result<()> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if silent {
                    return Ok(());
                }
                return Err(e)
                    .with_context(|| format!("reading config file {path:?}"));
            },
        };

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((directive, value, append)) = split_directive(line) else {
                warn!(file = ?path, line = lineno + 1, "ignoring malformed config line");
                continue;
            };

            match directive.as_str() {
                "include" => {
                    info!(file = %value, "including sub-config file");
                    self.parse_file(Path::new(&value), false)?;
                },
                "opt_include" => {
                    for g in glob::glob(&value)
                        .with_context(|| format!("bad opt_include glob {value}"))?
                        .flatten()
                    {
                        if g.is_file() {
                            info!(file = ?g, "loading optional sub-config file");
                            self.parse_file(&g, true)?;
                        }
                    }
                },
                "opt_override" => {
                    let mut state =
                        self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.override_files.push(value);
                },
                key => {
                    let mut state =
                        self.state.lock().unwrap_or_else(|e| e.into_inner());
                    let entity = ConfigEntity {
                        value,
                        source: path.display().to_string(),
                        append,
                    };
                    // Within one pass values stack, so multi-valued keys
                    // (manuf=, log_types=) accumulate; fetch_opt reads the
                    // last entry, fetch_opt_vec reads them all.
                    state.map.entry(key.to_string()).or_default().push(entity);
                },
            }
        }

        Ok(())
    }

    /// Override files replace whole keys unless every entry for the key
    /// appends, in which case values concatenate onto the parent's.
    fn parse_override(&self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading override config file {path:?}"))?;

        let mut incoming: HashMap<String, Vec<ConfigEntity>> = HashMap::new();

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value, append)) = split_directive(line) else {
                continue;
            };
            incoming.entry(key).or_default().push(ConfigEntity {
                value,
                source: path.display().to_string(),
                append,
            });
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for (key, entries) in incoming {
            let all_append = entries.iter().all(|e| e.append);
            let list = state.map.entry(key).or_default();
            if all_append {
                list.extend(entries);
            } else {
                *list = entries;
            }
        }

        Ok(())
    }

    // ── fetchers ────────────────────────────────────────────────────────

    pub fn fetch_opt(&self, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .map
            .get(&key.to_lowercase())
            .and_then(|v| v.last())
            .map(|e| e.value.clone())
    }

    pub fn fetch_opt_dfl(&self, key: &str, dfl: &str) -> String {
        self.fetch_opt(key).unwrap_or_else(|| dfl.to_string())
    }

    pub fn fetch_opt_vec(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .map
            .get(&key.to_lowercase())
            .map(|v| v.iter().map(|e| e.value.clone()).collect())
            .unwrap_or_default()
    }

    pub fn fetch_opt_bool(&self, key: &str, dfl: bool) -> bool {
        match self.fetch_opt(key) {
            Some(v) => matches!(v.to_lowercase().as_str(), "true" | "yes" | "1"),
            None => dfl,
        }
    }

    pub fn fetch_opt_as<T: std::str::FromStr>(&self, key: &str, dfl: T) -> T {
        self.fetch_opt(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(dfl)
    }

    pub fn set_opt(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.map.insert(
            key.to_lowercase(),
            vec![ConfigEntity {
                value: value.to_string(),
                source: "::dynamic::".to_string(),
                append: false,
            }],
        );
        drop(state);
        self.recalculate_checksum();
    }

    /// Adler32 over the sorted key/value content, used to detect config
    /// changes across restarts.
    pub fn checksum(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .checksum
    }

    fn recalculate_checksum(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut keys: Vec<&String> = state.map.keys().collect();
        keys.sort();

        let mut cks = String::new();
        for k in &keys {
            cks.push_str(k);
            if let Some(list) = state.map.get(*k) {
                for e in list {
                    cks.push_str(&e.value);
                }
            }
        }

        state.checksum = adler32(cks.as_bytes());
    }

    // ── log path templates ──────────────────────────────────────────────

    /// Expands a single iteration of a `%`-template.
    pub fn process_log_template(
        &self,
        template: &str,
        logname: &str,
        log_class: &str,
        iteration: u32,
    ) -> String {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());

        let mut out = String::with_capacity(template.len() * 2);
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            match chars.next() {
                Some('n') => out.push_str(logname),
                Some('l') => out.push_str(log_class),
                Some('d') => {
                    out.push_str(&self.start_time.format("%b-%d-%Y").to_string())
                },
                Some('D') => {
                    out.push_str(&self.start_time.format("%Y%m%d").to_string())
                },
                Some('t') => {
                    out.push_str(&self.start_time.format("%H-%M-%S").to_string())
                },
                Some('T') => {
                    out.push_str(&self.start_time.format("%H%M%S").to_string())
                },
                Some('i') => out.push_str(&iteration.to_string()),
                Some('I') => out.push_str(&format!("{iteration:06}")),
                Some('h') => out.push_str(&paths.home_dir),
                Some('p') => {
                    let mut pfx = paths.log_prefix.clone();
                    if !pfx.is_empty() && !pfx.ends_with('/') {
                        pfx.push('/');
                    }
                    out.push_str(&pfx);
                },
                Some('S') => out.push_str(&paths.data_dir),
                Some('E') => out.push_str(&paths.etc_dir),
                Some('B') => out.push_str(&paths.bin_dir),
                Some(other) => {
                    // Unknown expansions drop, matching historic behavior.
                    warn!(op = %other, "unknown log template expansion");
                },
                None => {},
            }
        }

        out
    }

    fn collides(path: &str) -> bool {
        Path::new(path).exists()
            || Path::new(&format!("{path}.gz")).exists()
            || Path::new(&format!("{path}.bz2")).exists()
    }

    /// Expands a log template into a concrete free path.
    ///
    /// With `%i`/`%I` present, iterations `start..10000` are probed and the
    /// first path with no existing file (or compressed sibling) wins. With
    /// `overwrite`, the first expansion is returned without probing.
    pub fn expand_log_path(
        &self,
        template: &str,
        logname: &str,
        log_class: &str,
        start: u32,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let incremental = template.contains("%i") || template.contains("%I");

        if incremental {
            for i in start..10_000 {
                let candidate =
                    self.process_log_template(template, logname, log_class, i);

                if overwrite {
                    return Ok(PathBuf::from(candidate));
                }

                if Self::collides(&candidate) {
                    continue;
                }

                return Ok(PathBuf::from(candidate));
            }

            bail!(
                "could not allocate a log file for {logname} ({log_class}) in a \
                 reasonable number of iterations; move old logs out of the way?"
            );
        }

        let candidate = self.process_log_template(template, logname, log_class, 0);

        if !overwrite && Self::collides(&candidate) {
            bail!("log file {candidate} already exists");
        }

        Ok(PathBuf::from(candidate))
    }
}

fn split_directive(line: &str) -> Option<(String, String, bool)> {
    let eq = line.find('=')?;
    if eq == 0 {
        return None;
    }

    let (mut key, value) = (line[..eq].trim(), line[eq + 1..].trim());
    let mut append = false;

    if let Some(stripped) = key.strip_suffix('+') {
        key = stripped.trim();
        append = true;
    }

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key.to_lowercase(), value.to_string(), append))
}
