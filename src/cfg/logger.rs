// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracing initialization driven by the server config store.
//!
//! Config keys: `log_level` (env-filter syntax), `log_output`
//! (stdout|stderr|file), `log_file`, `log_rotation`
//! (minutely|hourly|daily|never).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fastrace::collector::{Config as TraceConfig, ConsoleReporter};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
};

use crate::cfg::config::ConfigFile;

/// Installs the global subscriber. The returned guard must live as long as
/// the process so buffered log lines flush on shutdown.
pub fn init_logger(config: &ConfigFile) -> Result<WorkerGuard> {
    let (writer, guard) = make_writer(config)?;

    fastrace::set_reporter(ConsoleReporter, TraceConfig::default());
    let compat_layer = fastrace_tracing::FastraceCompatLayer::new();

    let level = config.fetch_opt_dfl("log_level", "info");
    let env_filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    let json_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(false);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(compat_layer)
        .with(json_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    Ok(guard)
}

fn make_writer(config: &ConfigFile) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let output = config.fetch_opt_dfl("log_output", "stderr");

    Ok(match output.as_str() {
        "stdout" => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(w), g)
        },
        "file" => {
            let file = config
                .fetch_opt("log_file")
                .context("log_file is required for log_output=file")?;
            let path = PathBuf::from(&file);
            let dir = path.parent().unwrap_or_else(|| Path::new(""));

            let rotation =
                match config.fetch_opt_dfl("log_rotation", "never").as_str() {
                    "minutely" => Rotation::MINUTELY,
                    "hourly" => Rotation::HOURLY,
                    "daily" => Rotation::DAILY,
                    _ => Rotation::NEVER,
                };

            let appender = RollingFileAppender::new(
                rotation,
                dir,
                path.file_name().unwrap_or_default(),
            );
            let (w, g) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(w), g)
        },
        _ => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (BoxMakeWriter::new(w), g)
        },
    })
}
