// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Alert registry and firehose.
//!
//! Classifiers and trackers raise alerts by registered name; the tracker
//! keeps a bounded ring of recent alerts for the REST view and fans live
//! alerts out over a broadcast channel for websocket monitors.

use std::{
    collections::VecDeque,
    sync::{Mutex, RwLock},
};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    models::{
        elements::{Element, FieldRegistry},
        mac::MacAddr,
    },
    utils::now_unix,
};

const RECENT_CAP: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertDefinition {
    pub name: String,
    pub description: String,
    pub severity: AlertSeverity,
}

/// One raised alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub name: String,
    pub severity: AlertSeverity,
    pub ts: u64,
    pub source: Option<MacAddr>,
    pub dest: Option<MacAddr>,
    pub text: String,
}

pub struct AlertTracker {
    definitions: RwLock<Vec<AlertDefinition>>,
    recent: Mutex<VecDeque<Alert>>,
    tx: broadcast::Sender<Alert>,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertTracker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            definitions: RwLock::new(Vec::new()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAP)),
            tx,
        }
    }

    /// Registers an alert type; re-registration by name is a no-op.
    pub fn register(
        &self,
        name: &str,
        description: &str,
        severity: AlertSeverity,
    ) {
        let mut defs = self.definitions.write().unwrap_or_else(|e| e.into_inner());

        if defs.iter().any(|d| d.name == name) {
            return;
        }

        defs.push(AlertDefinition {
            name: name.to_string(),
            description: description.to_string(),
            severity,
        });
    }

    pub fn definitions(&self) -> Vec<AlertDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Raises an alert against a device pair. Unregistered names raise at
    /// medium severity rather than being dropped.
    pub fn raise(
        &self,
        name: &str,
        source: Option<MacAddr>,
        dest: Option<MacAddr>,
        text: String,
    ) {
        let severity = self
            .definitions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.severity)
            .unwrap_or(AlertSeverity::Medium);

        let alert = Alert {
            name: name.to_string(),
            severity,
            ts: now_unix(),
            source,
            dest,
            text,
        };

        info!(alert = %alert.name, text = %alert.text, "alert raised");

        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == RECENT_CAP {
                recent.pop_front();
            }
            recent.push_back(alert.clone());
        }

        let _ = self.tx.send(alert);
    }

    /// One-shot system alert with no device attribution.
    pub fn raise_one_shot(&self, name: &str, severity: AlertSeverity, text: &str) {
        self.register(name, text, severity);
        self.raise(name, None, None, text.to_string());
    }

    pub fn recent(&self) -> Vec<Alert> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Live subscription for websocket monitors.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

/// Field ids for alert snapshots, registered once at startup.
pub struct AlertFields {
    name: u16,
    severity: u16,
    ts: u16,
    source: u16,
    dest: u16,
    text: u16,
}

impl AlertFields {
    pub fn register(reg: &FieldRegistry) -> Self {
        Self {
            name: reg.register("alert.name", "alert type name"),
            severity: reg.register("alert.severity", "alert severity"),
            ts: reg.register("alert.timestamp", "unix timestamp"),
            source: reg.register("alert.source_mac", "source device"),
            dest: reg.register("alert.dest_mac", "destination device"),
            text: reg.register("alert.text", "alert text"),
        }
    }

    pub fn to_element(&self, alert: &Alert) -> Element {
        let mut el = Element::map();
        el.insert(self.name, Element::String(alert.name.clone()));
        el.insert(
            self.severity,
            Element::String(format!("{:?}", alert.severity).to_lowercase()),
        );
        el.insert(self.ts, Element::U64(alert.ts));
        if let Some(m) = alert.source {
            el.insert(self.source, Element::Mac(m));
        }
        if let Some(m) = alert.dest {
            el.insert(self.dest, Element::Mac(m));
        }
        el.insert(self.text, Element::String(alert.text.clone()));
        el
    }
}
