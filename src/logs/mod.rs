// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Log driver registry and active log lifecycle.
//!
//! A driver describes a log class (name, singleton flag, builder); the
//! tracker opens instances against template-expanded paths and keeps the
//! active vector for the API. A closed log cannot reopen; callers open a
//! fresh instance instead.

pub mod pcap_http;
pub mod pcapng_log;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, bail};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    cfg::config::ConfigFile,
    models::elements::{Element, FieldRegistry},
};

/// One live log instance.
pub trait Logfile: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn path(&self) -> PathBuf;
    fn log_class(&self) -> &'static str;
    fn is_open(&self) -> bool;
    /// Closes the sink and unregisters any chain handlers. Idempotent.
    fn close(&self);
    /// Pushes buffered output to disk; driven by the timer sweep.
    fn flush(&self) {}
    fn bytes_written(&self) -> u64;
    fn packets_written(&self) -> u64;
}

/// A registered log class.
pub trait LogfileBuilder: Send + Sync {
    fn log_class(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn singleton(&self) -> bool;
    fn build(&self, path: PathBuf) -> Result<Arc<dyn Logfile>>;
}

struct LogFields {
    driver_class: u16,
    driver_description: u16,
    driver_singleton: u16,
    log_uuid: u16,
    log_class: u16,
    log_path: u16,
    log_open: u16,
    log_bytes: u16,
    log_packets: u16,
}

pub struct LogTracker {
    drivers: Mutex<Vec<Arc<dyn LogfileBuilder>>>,
    logfiles: Mutex<Vec<Arc<dyn Logfile>>>,
    config: Arc<ConfigFile>,
    title: String,
    template: String,
    enabled: bool,
    fields: LogFields,
}

impl LogTracker {
    pub fn new(
        config: Arc<ConfigFile>,
        reg: &FieldRegistry,
        title: String,
        enabled: bool,
    ) -> Self {
        let template =
            config.fetch_opt_dfl("log_template", "%p/%n-%D-%t-%i.%l");

        Self {
            drivers: Mutex::new(Vec::new()),
            logfiles: Mutex::new(Vec::new()),
            config,
            title,
            template,
            enabled,
            fields: LogFields {
                driver_class: reg
                    .register("kismet.logtracker.driver.class", "log class"),
                driver_description: reg.register(
                    "kismet.logtracker.driver.description",
                    "log class description",
                ),
                driver_singleton: reg.register(
                    "kismet.logtracker.driver.singleton",
                    "single instance only",
                ),
                log_uuid: reg.register("kismet.logtracker.log.uuid", "log uuid"),
                log_class: reg.register("kismet.logtracker.log.class", "log class"),
                log_path: reg.register("kismet.logtracker.log.path", "log path"),
                log_open: reg.register("kismet.logtracker.log.open", "log open"),
                log_bytes: reg
                    .register("kismet.logtracker.log.bytes", "bytes written"),
                log_packets: reg
                    .register("kismet.logtracker.log.packets", "packets written"),
            },
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Registers a driver; duplicate classes are rejected.
    pub fn register_log(&self, builder: Arc<dyn LogfileBuilder>) -> Result<()> {
        let mut drivers = self.drivers.lock().unwrap_or_else(|e| e.into_inner());

        if drivers
            .iter()
            .any(|d| d.log_class().eq_ignore_ascii_case(builder.log_class()))
        {
            bail!(
                "a logfile driver is already registered for '{}'",
                builder.log_class()
            );
        }

        drivers.push(builder);
        Ok(())
    }

    /// Opens a log of the given class under the session title.
    pub fn open_log(&self, class: &str) -> Result<Arc<dyn Logfile>> {
        self.open_log_titled(class, &self.title)
    }

    pub fn open_log_titled(
        &self,
        class: &str,
        title: &str,
    ) -> Result<Arc<dyn Logfile>> {
        let builder = {
            let drivers = self.drivers.lock().unwrap_or_else(|e| e.into_inner());
            drivers
                .iter()
                .find(|d| d.log_class() == class)
                .cloned()
                .with_context(|| format!("no log driver for class '{class}'"))?
        };

        let mut logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());

        if builder.singleton()
            && let Some(open) = logfiles
                .iter()
                .find(|l| l.log_class() == builder.log_class() && l.is_open())
        {
            bail!(
                "failed to open {}, log already open at {}",
                builder.log_class(),
                open.path().display()
            );
        }

        let path = self
            .config
            .expand_log_path(&self.template, title, builder.log_class(), 1, false)
            .with_context(|| {
                format!("failed to resolve a log path for {}", builder.log_class())
            })?;

        let logfile = builder.build(path.clone()).with_context(|| {
            format!("failed to open {} log {}", builder.log_class(), path.display())
        })?;

        info!(class = builder.log_class(), path = ?path, "opened log");
        logfiles.push(Arc::clone(&logfile));

        Ok(logfile)
    }

    /// Closes the log with the given UUID. Returns false for unknown uuids.
    pub fn close_log(&self, uuid: Uuid) -> bool {
        let logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());

        match logfiles.iter().find(|l| l.uuid() == uuid) {
            Some(lf) => {
                info!(uuid = %uuid, path = ?lf.path(), "closing log file");
                lf.close();
                true
            },
            None => false,
        }
    }

    /// Opens every configured log type; failures are logged, not fatal.
    pub fn open_configured(&self, types: &[String]) {
        if !self.enabled {
            info!("logging disabled, not enabling any log drivers");
            return;
        }

        for t in types {
            if let Err(e) = self.open_log(t) {
                error!(class = %t, error = %e, "could not open configured log");
            }
        }
    }

    pub fn shutdown(&self) {
        let logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());
        for lf in logfiles.iter() {
            lf.close();
        }
    }

    pub fn flush_all(&self) {
        let logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());
        for lf in logfiles.iter() {
            if lf.is_open() {
                lf.flush();
            }
        }
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<Arc<dyn Logfile>> {
        let logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());
        logfiles.iter().find(|l| l.uuid() == uuid).cloned()
    }

    // ── snapshots ───────────────────────────────────────────────────────

    pub fn drivers_element(&self) -> Element {
        let drivers = self.drivers.lock().unwrap_or_else(|e| e.into_inner());

        Element::Vector(
            drivers
                .iter()
                .map(|d| {
                    let mut el = Element::map();
                    el.insert(
                        self.fields.driver_class,
                        Element::String(d.log_class().to_string()),
                    );
                    el.insert(
                        self.fields.driver_description,
                        Element::String(d.description().to_string()),
                    );
                    el.insert(
                        self.fields.driver_singleton,
                        Element::Bool(d.singleton()),
                    );
                    el
                })
                .collect(),
        )
    }

    pub fn active_element(&self) -> Element {
        let logfiles = self.logfiles.lock().unwrap_or_else(|e| e.into_inner());

        Element::Vector(
            logfiles
                .iter()
                .map(|l| {
                    let mut el = Element::map();
                    el.insert(
                        self.fields.log_uuid,
                        Element::Uuid(l.uuid()),
                    );
                    el.insert(
                        self.fields.log_class,
                        Element::String(l.log_class().to_string()),
                    );
                    el.insert(
                        self.fields.log_path,
                        Element::String(l.path().display().to_string()),
                    );
                    el.insert(self.fields.log_open, Element::Bool(l.is_open()));
                    el.insert(self.fields.log_bytes, Element::U64(l.bytes_written()));
                    el.insert(
                        self.fields.log_packets,
                        Element::U64(l.packets_written()),
                    );
                    el
                })
                .collect(),
        )
    }
}
