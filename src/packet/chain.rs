// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ordered, prioritized dispatch of frames through registered handlers.
//!
//! A frame walks the positions in declaration order; within a position,
//! handlers run by ascending priority with registration order breaking
//! ties. Handlers run on whatever thread called [`PacketChain::process_packet`]
//! and must not block; anything that needs to wait offloads or drops.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        RwLock,
        atomic::{AtomicU16, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tracing::warn;

use crate::packet::frame::{ComponentId, Frame};

/// Pipeline positions in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPos {
    PostCap,
    LlcDissect,
    Decrypt,
    DataDissect,
    Classifier,
    Tracker,
    Logging,
    Destroy,
}

impl ChainPos {
    pub const ALL: [ChainPos; 8] = [
        ChainPos::PostCap,
        ChainPos::LlcDissect,
        ChainPos::Decrypt,
        ChainPos::DataDissect,
        ChainPos::Classifier,
        ChainPos::Tracker,
        ChainPos::Logging,
        ChainPos::Destroy,
    ];

    fn index(self) -> usize {
        match self {
            ChainPos::PostCap => 0,
            ChainPos::LlcDissect => 1,
            ChainPos::Decrypt => 2,
            ChainPos::DataDissect => 3,
            ChainPos::Classifier => 4,
            ChainPos::Tracker => 5,
            ChainPos::Logging => 6,
            ChainPos::Destroy => 7,
        }
    }
}

/// A pipeline stage. Implementations hold their own context clones; the
/// return value is the chain verdict: negative halts the remaining chain
/// for this frame.
pub trait ChainHandler: Send + Sync {
    fn name(&self) -> &'static str {
        "handler"
    }

    fn handle(&self, frame: &mut Frame) -> i32;
}

impl<F> ChainHandler for F
where F: Fn(&mut Frame) -> i32 + Send + Sync
{
    fn handle(&self, frame: &mut Frame) -> i32 {
        self(frame)
    }
}

pub type HandlerId = u64;

struct Registered {
    id: HandlerId,
    priority: i32,
    handler: Box<dyn ChainHandler>,
}

/// Per-chain counters surfaced through `/system/status`.
#[derive(Default)]
pub struct ChainStats {
    pub processed: AtomicU64,
    pub handler_errors: AtomicU64,
    pub duplicates: AtomicU64,
    pub halted: AtomicU64,
}

pub struct PacketChain {
    positions: [RwLock<Vec<Registered>>; 8],
    next_handler_id: AtomicU64,
    component_ids: DashMap<String, ComponentId>,
    next_component_id: AtomicU16,
    pub stats: ChainStats,
}

impl Default for PacketChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketChain {
    pub fn new() -> Self {
        Self {
            positions: std::array::from_fn(|_| RwLock::new(Vec::new())),
            next_handler_id: AtomicU64::new(1),
            component_ids: DashMap::new(),
            next_component_id: AtomicU16::new(0),
            stats: ChainStats::default(),
        }
    }

    /// Interns a component name; the same name always yields the same id
    /// for the life of the process.
    pub fn register_packet_component(&self, name: &str) -> ComponentId {
        *self
            .component_ids
            .entry(name.to_string())
            .or_insert_with(|| self.next_component_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers a handler at a position; lower priorities run earlier.
    /// Returns the id used for removal.
    pub fn register_handler(
        &self,
        pos: ChainPos,
        priority: i32,
        handler: Box<dyn ChainHandler>,
    ) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        let mut list = self.positions[pos.index()]
            .write()
            .unwrap_or_else(|e| e.into_inner());

        // Stable insert: after every entry with priority <= ours.
        let at = list.partition_point(|r| r.priority <= priority);
        list.insert(at, Registered { id, priority, handler });

        id
    }

    /// Removes a handler; unknown ids are ignored.
    pub fn remove_handler(&self, pos: ChainPos, id: HandlerId) {
        let mut list = self.positions[pos.index()]
            .write()
            .unwrap_or_else(|e| e.into_inner());
        list.retain(|r| r.id != id);
    }

    /// Runs the frame through every position.
    ///
    /// `error` frames skip CLASSIFIER and TRACKER but still reach LOGGING
    /// for forensics; `filtered` frames skip LOGGING. DESTROY always runs.
    /// A panicking handler is logged and skipped; the chain continues.
    pub fn process_packet(&self, frame: &mut Frame) {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        'positions: for pos in ChainPos::ALL {
            match pos {
                ChainPos::Classifier | ChainPos::Tracker if frame.error => continue,
                ChainPos::Logging if frame.filtered => continue,
                _ => {},
            }

            let list = self.positions[pos.index()]
                .read()
                .unwrap_or_else(|e| e.into_inner());

            for reg in list.iter() {
                let verdict =
                    catch_unwind(AssertUnwindSafe(|| reg.handler.handle(frame)));

                match verdict {
                    Ok(v) if v < 0 => {
                        self.stats.halted.fetch_add(1, Ordering::Relaxed);
                        break 'positions;
                    },
                    Ok(_) => {},
                    Err(_) => {
                        self.stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            handler = reg.handler.name(),
                            position = ?pos,
                            "packet handler panicked; continuing chain"
                        );
                    },
                }
            }
        }

        if frame.duplicate {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of handlers currently registered at a position.
    pub fn handler_count(&self, pos: ChainPos) -> usize {
        self.positions[pos.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
