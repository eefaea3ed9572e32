// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Registry of live streaming sinks (HTTP pcap subscriptions, file logs).
//!
//! Every active sink registers here so the API can enumerate, pause, and
//! stop streams and account for bytes moved.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::models::elements::{Element, FieldRegistry};

pub struct StreamEntry {
    pub id: u64,
    pub name: String,
    pub stream_type: String,
    pub agent: String,
    pub description: String,
    bytes: AtomicU64,
    packets: AtomicU64,
    paused: AtomicBool,
    /// Cancelled when the stream is stopped from the API side.
    pub cancel: CancellationToken,
}

impl StreamEntry {
    pub fn account(&self, bytes: u64, packets: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.packets.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

pub struct StreamFields {
    id: u16,
    name: u16,
    stream_type: u16,
    agent: u16,
    description: u16,
    bytes: u16,
    packets: u16,
    paused: u16,
}

pub struct StreamTracker {
    streams: DashMap<u64, Arc<StreamEntry>>,
    next_id: AtomicU64,
    fields: StreamFields,
}

impl StreamTracker {
    pub fn new(reg: &FieldRegistry) -> Self {
        Self {
            streams: DashMap::new(),
            next_id: AtomicU64::new(1),
            fields: StreamFields {
                id: reg.register("kismet.stream.id", "stream id"),
                name: reg.register("kismet.stream.name", "stream name"),
                stream_type: reg.register("kismet.stream.type", "stream type"),
                agent: reg.register("kismet.stream.agent", "creating agent"),
                description: reg
                    .register("kismet.stream.description", "stream description"),
                bytes: reg.register("kismet.stream.bytes", "bytes streamed"),
                packets: reg.register("kismet.stream.packets", "packets streamed"),
                paused: reg.register("kismet.stream.paused", "stream paused"),
            },
        }
    }

    pub fn register(
        &self,
        name: &str,
        stream_type: &str,
        agent: &str,
        description: &str,
    ) -> Arc<StreamEntry> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let entry = Arc::new(StreamEntry {
            id,
            name: name.to_string(),
            stream_type: stream_type.to_string(),
            agent: agent.to_string(),
            description: description.to_string(),
            bytes: AtomicU64::new(0),
            packets: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        self.streams.insert(id, Arc::clone(&entry));
        entry
    }

    pub fn remove(&self, id: u64) -> bool {
        self.streams.remove(&id).is_some()
    }

    pub fn get(&self, id: u64) -> Option<Arc<StreamEntry>> {
        self.streams.get(&id).map(|e| Arc::clone(&e))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Stops a stream by cancelling its token; the owning task removes the
    /// registry entry as it unwinds.
    pub fn stop(&self, id: u64) -> bool {
        match self.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            },
            None => false,
        }
    }

    pub fn pause(&self, id: u64) -> bool {
        self.get(id).map(|e| e.set_paused(true)).is_some()
    }

    pub fn resume(&self, id: u64) -> bool {
        self.get(id).map(|e| e.set_paused(false)).is_some()
    }

    pub fn to_element(&self) -> Element {
        let items = self
            .streams
            .iter()
            .map(|e| {
                let s = e.value();
                let mut el = Element::map();
                el.insert(self.fields.id, Element::U64(s.id));
                el.insert(self.fields.name, Element::String(s.name.clone()));
                el.insert(
                    self.fields.stream_type,
                    Element::String(s.stream_type.clone()),
                );
                el.insert(self.fields.agent, Element::String(s.agent.clone()));
                el.insert(
                    self.fields.description,
                    Element::String(s.description.clone()),
                );
                el.insert(self.fields.bytes, Element::U64(s.bytes()));
                el.insert(self.fields.packets, Element::U64(s.packets()));
                el.insert(self.fields.paused, Element::Bool(s.is_paused()));
                el
            })
            .collect();

        Element::Vector(items)
    }
}
