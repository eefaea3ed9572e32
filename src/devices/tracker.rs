// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The device tracker: single source of truth for devices across phys.
//!
//! Devices live in an arena keyed by a monotonic internal id; the key map
//! points into the arena. Sub-records refer to device keys, never to other
//! device structs, so the graph stays acyclic. Callers get an opaque handle
//! and run closures under the per-device lock; references never cross a
//! thread boundary.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    devices::{
        base::{DeviceFields, TrackedDevice},
        key::DeviceKey,
    },
    models::elements::{Element, FieldRegistry},
    utils::now_unix,
};

/// Opaque accessor for one device; clones are cheap.
#[derive(Clone)]
pub struct DeviceHandle(Arc<RwLock<TrackedDevice>>);

impl DeviceHandle {
    pub fn read<R>(&self, f: impl FnOnce(&TrackedDevice) -> R) -> R {
        let guard = self.0.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut TrackedDevice) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

pub struct DeviceTracker {
    arena: RwLock<Vec<Option<DeviceHandle>>>,
    by_key: DashMap<DeviceKey, u64>,
    next_id: AtomicU64,
    idle_timeout_secs: AtomicU64,
    min_idle_packets: AtomicU64,
    pub fields: DeviceFields,
}

impl DeviceTracker {
    /// `idle_timeout_secs == 0` disables expiry entirely.
    pub fn new(
        registry: &FieldRegistry,
        idle_timeout_secs: u64,
        min_idle_packets: u64,
    ) -> Self {
        Self {
            arena: RwLock::new(Vec::new()),
            by_key: DashMap::new(),
            next_id: AtomicU64::new(1),
            idle_timeout_secs: AtomicU64::new(idle_timeout_secs),
            min_idle_packets: AtomicU64::new(min_idle_packets),
            fields: DeviceFields::register(registry),
        }
    }

    /// Runtime reconfiguration, honored on the next sweep.
    pub fn set_idle_config(&self, timeout_secs: u64, min_packets: u64) {
        self.idle_timeout_secs.store(timeout_secs, Ordering::SeqCst);
        self.min_idle_packets.store(min_packets, Ordering::SeqCst);
    }

    /// Atomic lookup-or-insert; the bool reports creation.
    pub fn get_or_create(
        &self,
        key: DeviceKey,
        phy_name: Arc<str>,
        manuf: Arc<str>,
    ) -> (DeviceHandle, bool) {
        // Fast path outside the arena lock.
        if let Some(id) = self.by_key.get(&key)
            && let Some(handle) = self.by_id(*id)
        {
            return (handle, false);
        }

        let entry = self.by_key.entry(key);

        match entry {
            dashmap::mapref::entry::Entry::Occupied(o) => {
                let id = *o.get();
                match self.by_id(id) {
                    Some(handle) => (handle, false),
                    // Raced an eviction; retake the slot.
                    None => {
                        let (handle, id) = self.insert_new(key, phy_name, manuf);
                        let mut o = o;
                        *o.get_mut() = id;
                        (handle, true)
                    },
                }
            },
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let (handle, id) = self.insert_new(key, phy_name, manuf);
                v.insert(id);
                (handle, true)
            },
        }
    }

    fn insert_new(
        &self,
        key: DeviceKey,
        phy_name: Arc<str>,
        manuf: Arc<str>,
    ) -> (DeviceHandle, u64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let device = TrackedDevice::new(key, id, phy_name, manuf, now_unix());
        let handle = DeviceHandle(Arc::new(RwLock::new(device)));

        let mut arena = self.arena.write().unwrap_or_else(|e| e.into_inner());
        let idx = id as usize;
        if arena.len() <= idx {
            arena.resize_with(idx + 1, || None);
        }
        arena[idx] = Some(handle.clone());

        (handle, id)
    }

    fn by_id(&self, id: u64) -> Option<DeviceHandle> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        arena.get(id as usize)?.clone()
    }

    pub fn fetch(&self, key: DeviceKey) -> Option<DeviceHandle> {
        let id = *self.by_key.get(&key)?;
        self.by_id(id)
    }

    pub fn devices_by_phy(&self, phy: u32) -> Vec<DeviceHandle> {
        self.by_key
            .iter()
            .filter(|e| e.key().phy == phy)
            .filter_map(|e| self.by_id(*e.value()))
            .collect()
    }

    pub fn all_devices(&self) -> Vec<DeviceHandle> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        arena.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Evicts devices idle past the timeout that never crossed the packet
    /// floor. Returns the eviction count.
    pub fn expire_idle(&self, now: u64) -> usize {
        let timeout = self.idle_timeout_secs.load(Ordering::SeqCst);
        if timeout == 0 {
            return 0;
        }
        let min_packets = self.min_idle_packets.load(Ordering::SeqCst);

        let mut victims = Vec::new();

        for entry in self.by_key.iter() {
            let id = *entry.value();
            if let Some(handle) = self.by_id(id) {
                let expired = handle.read(|d| {
                    d.last_time + timeout < now && d.packets < min_packets
                });
                if expired {
                    victims.push((*entry.key(), id));
                }
            }
        }

        for (key, id) in &victims {
            self.by_key.remove(key);
            let mut arena = self.arena.write().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = arena.get_mut(*id as usize) {
                *slot = None;
            }
        }

        if !victims.is_empty() {
            debug!(count = victims.len(), "expired idle devices");
        }

        victims.len()
    }

    /// Per-second sweep duties: reset dot11 beacon counters.
    pub fn rotate_second(&self) {
        for handle in self.all_devices() {
            handle.write(|d| {
                if let Some(d11) =
                    d.phy_record.as_mut().and_then(|p| p.dot11_mut())
                {
                    d11.rotate_beacon_counters();
                }
            });
        }
    }

    // ── snapshots ───────────────────────────────────────────────────────

    pub fn device_element(&self, key: DeviceKey) -> Option<Element> {
        let handle = self.fetch(key)?;
        Some(handle.read(|d| self.fields.to_element(d)))
    }

    pub fn devices_element(&self, phy: Option<u32>) -> Element {
        let handles = match phy {
            Some(p) => self.devices_by_phy(p),
            None => self.all_devices(),
        };

        Element::Vector(
            handles
                .iter()
                .map(|h| h.read(|d| self.fields.to_element(d)))
                .collect(),
        )
    }
}
