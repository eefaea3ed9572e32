// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Capture-source integration: the bounded frame queue between capture
//! producers and the processing thread that drives the packet chain.
//!
//! Sources are opaque collaborators; anything that can hand over
//! timestamped frames plugs in through [`CaptureSource`]. The queue applies
//! oldest-discard on overflow and counts the drops for `/system/status`.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::packet::{chain::PacketChain, frame::Frame};

/// Default queue depth per processing queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 4096;

/// A producer of timestamped frames. Implementations block in `run` until
/// the source ends or the token cancels.
pub trait CaptureSource: Send + 'static {
    fn name(&self) -> &str;
    fn run(self: Box<Self>, queue: Arc<FrameQueue>, cancel: CancellationToken);
}

struct QueueInner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded MPSC frame queue with oldest-discard overflow.
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
    capacity: usize,
    drops: Arc<AtomicU64>,
    drop_warned: AtomicBool,
}

impl FrameQueue {
    pub fn new(capacity: usize, drops: Arc<AtomicU64>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cond: Condvar::new(),
            capacity,
            drops,
            drop_warned: AtomicBool::new(false),
        }
    }

    /// Enqueues a frame; when full the oldest queued frame is discarded and
    /// the drop counter incremented.
    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.closed {
            return;
        }

        if inner.frames.len() == self.capacity {
            inner.frames.pop_front();
            self.drops.fetch_add(1, Ordering::Relaxed);

            if !self.drop_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    "capture queue overflow, discarding oldest frames; see \
                     /system/status for the running count"
                );
            }
        }

        inner.frames.push_back(frame);
        drop(inner);
        self.cond.notify_one();
    }

    /// Blocks for the next frame; None once closed and drained.
    pub fn pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .cond
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.closed = true;
        drop(inner);
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns the processing thread: drains the queue and walks each frame
/// through the chain until the queue closes.
pub fn spawn_processing_thread(
    queue: Arc<FrameQueue>,
    chain: Arc<PacketChain>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("packet-processing".into())
        .spawn(move || {
            while let Some(mut frame) = queue.pop() {
                chain.process_packet(&mut frame);
            }
            info!("packet processing thread draining complete");
        })
}

/// Spawns a capture source on its own thread.
pub fn spawn_source(
    source: Box<dyn CaptureSource>,
    queue: Arc<FrameQueue>,
    cancel: CancellationToken,
) -> std::io::Result<thread::JoinHandle<()>> {
    let name = source.name().to_string();

    thread::Builder::new()
        .name(format!("capture-{name}"))
        .spawn(move || {
            info!(source = %name, "capture source started");
            source.run(queue, cancel);
            info!(source = %name, "capture source finished");
        })
}
