// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Command-line overrides for the logging subsystem; flags win over the
/// config file.
#[derive(Debug, Default, Clone)]
pub struct LogOverrides {
    pub log_types: Option<String>,
    pub log_title: Option<String>,
    pub log_prefix: Option<String>,
    pub no_logging: bool,
}

impl LogOverrides {
    /// Parses `-T/--log-types`, `-t/--log-title`, `-p/--log-prefix`, and
    /// `-n/--no-logging` out of an argument list; unknown flags are left
    /// for other consumers.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut out = Self::default();
        let mut iter = args.into_iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-T" | "--log-types" => out.log_types = iter.next(),
                "-t" | "--log-title" => out.log_title = iter.next(),
                "-p" | "--log-prefix" => out.log_prefix = iter.next(),
                "-n" | "--no-logging" => out.no_logging = true,
                _ => {},
            }
        }

        out
    }
}
