// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The frame container passed through the packet chain.

use std::{any::Any, sync::Arc};

use anyhow::{Result, bail};
use bytes::Bytes;

pub type ComponentId = u16;

/// An immutable captured frame plus the typed annotations the pipeline
/// stages attach to it.
///
/// The byte buffer never changes after capture; stages communicate through
/// components keyed by interned component ids. A component is attached once
/// and never replaced.
pub struct Frame {
    /// Capture timestamp, microseconds since the unix epoch.
    pub ts_us: u64,
    /// Raw link-layer bytes.
    pub data: Bytes,
    /// Link type of `data` (pcap DLT numbering).
    pub dlt: u32,
    /// Name of the capture source that produced the frame.
    pub source: Arc<str>,

    /// Set by any stage to make LOGGING skip the frame.
    pub filtered: bool,
    /// Set by the classifier when the packet hash was recently seen.
    pub duplicate: bool,
    /// Set on parse failure; ends classification but not logging.
    pub error: bool,

    components: Vec<Option<Arc<dyn Any + Send + Sync>>>,
}

impl Frame {
    pub fn new(ts_us: u64, dlt: u32, source: Arc<str>, data: Bytes) -> Self {
        Self {
            ts_us,
            data,
            dlt,
            source,
            filtered: false,
            duplicate: false,
            error: false,
            components: Vec::new(),
        }
    }

    /// Attaches a component. Attaching the same id twice is a programmer
    /// error surfaced to the caller.
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        id: ComponentId,
        value: T,
    ) -> Result<()> {
        let idx = id as usize;

        if self.components.len() <= idx {
            self.components.resize_with(idx + 1, || None);
        }

        if self.components[idx].is_some() {
            bail!("component {id} already attached");
        }

        self.components[idx] = Some(Arc::new(value));
        Ok(())
    }

    pub fn get<T: Any + Send + Sync>(&self, id: ComponentId) -> Option<&T> {
        self.components
            .get(id as usize)?
            .as_ref()?
            .downcast_ref::<T>()
    }

    pub fn get_arc<T: Any + Send + Sync>(&self, id: ComponentId) -> Option<Arc<T>> {
        let arc = self.components.get(id as usize)?.clone()?;
        arc.downcast::<T>().ok()
    }

    pub fn has(&self, id: ComponentId) -> bool {
        matches!(self.components.get(id as usize), Some(Some(_)))
    }

    /// Ids of every attached component, for the superset invariant checks.
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| i as ComponentId))
            .collect()
    }
}
