// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The phy-independent tracked device record.

use std::sync::Arc;

use crate::{
    devices::key::DeviceKey,
    models::{
        elements::{Element, FieldRegistry},
        mac::MacAddr,
    },
    packet::components::GpsFix,
    phy80211::device::Dot11Device,
};

/// Signal observations folded per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalSummary {
    pub last_signal_dbm: i8,
    pub min_signal_dbm: i8,
    pub max_signal_dbm: i8,
    pub last_noise_dbm: i8,
    pub last_freq_mhz: u16,
}

impl SignalSummary {
    pub fn observe(&mut self, signal: i8, noise: i8, freq: u16) {
        if self.min_signal_dbm == 0 || signal < self.min_signal_dbm {
            self.min_signal_dbm = signal;
        }
        if self.max_signal_dbm == 0 || signal > self.max_signal_dbm {
            self.max_signal_dbm = signal;
        }
        self.last_signal_dbm = signal;
        self.last_noise_dbm = noise;
        if freq != 0 {
            self.last_freq_mhz = freq;
        }
    }
}

/// Positional envelope accumulated from per-frame fixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsAggregate {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    lat_sum: f64,
    lon_sum: f64,
    samples: u64,
    pub last_fix: Option<GpsFix>,
}

impl GpsAggregate {
    pub fn observe(&mut self, fix: GpsFix) {
        if fix.fix < 2 {
            return;
        }

        if self.samples == 0 {
            self.min_lat = fix.lat;
            self.max_lat = fix.lat;
            self.min_lon = fix.lon;
            self.max_lon = fix.lon;
        } else {
            self.min_lat = self.min_lat.min(fix.lat);
            self.max_lat = self.max_lat.max(fix.lat);
            self.min_lon = self.min_lon.min(fix.lon);
            self.max_lon = self.max_lon.max(fix.lon);
        }

        self.lat_sum += fix.lat;
        self.lon_sum += fix.lon;
        self.samples += 1;
        self.last_fix = Some(fix);
    }

    pub fn avg(&self) -> Option<(f64, f64)> {
        if self.samples == 0 {
            return None;
        }
        Some((
            self.lat_sum / self.samples as f64,
            self.lon_sum / self.samples as f64,
        ))
    }
}

/// Phy-specific child records; one variant per tracked phy family.
#[derive(Debug, Clone)]
pub enum PhyRecord {
    Dot11(Dot11Device),
}

impl PhyRecord {
    pub fn dot11(&self) -> Option<&Dot11Device> {
        match self {
            PhyRecord::Dot11(d) => Some(d),
        }
    }

    pub fn dot11_mut(&mut self) -> Option<&mut Dot11Device> {
        match self {
            PhyRecord::Dot11(d) => Some(d),
        }
    }
}

/// A tracked device. Identity fields (key, mac, phy) are fixed at creation;
/// everything else mutates under the per-device lock.
#[derive(Debug, Clone)]
pub struct TrackedDevice {
    pub key: DeviceKey,
    /// Tracker-internal monotonic id; never exposed for external keying.
    pub internal_id: u64,
    pub macaddr: MacAddr,
    pub phy_name: Arc<str>,
    pub name: String,
    pub manuf: Arc<str>,
    pub first_time: u64,
    pub last_time: u64,
    pub packets: u64,
    pub data_packets: u64,
    pub error_packets: u64,
    pub datasize: u64,
    pub channel: String,
    pub frequency: u16,
    pub signal: SignalSummary,
    pub gps: GpsAggregate,
    pub phy_record: Option<PhyRecord>,
}

impl TrackedDevice {
    pub fn new(
        key: DeviceKey,
        internal_id: u64,
        phy_name: Arc<str>,
        manuf: Arc<str>,
        now: u64,
    ) -> Self {
        Self {
            key,
            internal_id,
            macaddr: key.mac,
            phy_name,
            name: key.mac.to_string(),
            manuf,
            first_time: now,
            last_time: now,
            packets: 0,
            data_packets: 0,
            error_packets: 0,
            datasize: 0,
            channel: String::new(),
            frequency: 0,
            signal: SignalSummary::default(),
            gps: GpsAggregate::default(),
            phy_record: None,
        }
    }

    pub fn dot11(&self) -> Option<&Dot11Device> {
        self.phy_record.as_ref().and_then(PhyRecord::dot11)
    }

    /// The dot11 child record, created on first use.
    pub fn dot11_mut(&mut self) -> &mut Dot11Device {
        if self.phy_record.is_none() {
            self.phy_record = Some(PhyRecord::Dot11(Dot11Device::default()));
        }

        match self
            .phy_record
            .as_mut()
            .and_then(PhyRecord::dot11_mut)
        {
            Some(d) => d,
            // The variant was just set above.
            None => unreachable!(),
        }
    }
}

/// Field ids for base device snapshots, registered once at startup.
pub struct DeviceFields {
    key: u16,
    macaddr: u16,
    phy: u16,
    name: u16,
    manuf: u16,
    first_time: u16,
    last_time: u16,
    packets: u16,
    data_packets: u16,
    datasize: u16,
    channel: u16,
    frequency: u16,
    signal: u16,
    sig_last: u16,
    sig_min: u16,
    sig_max: u16,
    dot11: u16,
    dot11_fields: crate::phy80211::device::Dot11Fields,
}

impl DeviceFields {
    pub fn register(reg: &FieldRegistry) -> Self {
        Self {
            key: reg.register("kismet.device.base.key", "device key"),
            macaddr: reg.register("kismet.device.base.macaddr", "mac address"),
            phy: reg.register("kismet.device.base.phyname", "phy name"),
            name: reg.register("kismet.device.base.name", "device name"),
            manuf: reg.register("kismet.device.base.manuf", "manufacturer name"),
            first_time: reg
                .register("kismet.device.base.first_time", "first seen"),
            last_time: reg.register("kismet.device.base.last_time", "last seen"),
            packets: reg
                .register("kismet.device.base.packets.total", "total packets"),
            data_packets: reg
                .register("kismet.device.base.packets.data", "data packets"),
            datasize: reg.register("kismet.device.base.datasize", "total bytes"),
            channel: reg.register("kismet.device.base.channel", "last channel"),
            frequency: reg
                .register("kismet.device.base.frequency", "last frequency"),
            signal: reg.register("kismet.device.base.signal", "signal summary"),
            sig_last: reg
                .register("kismet.common.signal.last_signal", "last signal dbm"),
            sig_min: reg
                .register("kismet.common.signal.min_signal", "min signal dbm"),
            sig_max: reg
                .register("kismet.common.signal.max_signal", "max signal dbm"),
            dot11: reg.register("dot11.device", "802.11 record"),
            dot11_fields: crate::phy80211::device::Dot11Fields::register(reg),
        }
    }

    pub fn to_element(&self, dev: &TrackedDevice) -> Element {
        let mut el = Element::map();
        el.insert(self.key, Element::String(dev.key.to_string()));
        el.insert(self.macaddr, Element::Mac(dev.macaddr));
        el.insert(self.phy, Element::String(dev.phy_name.to_string()));
        el.insert(self.name, Element::String(dev.name.clone()));
        el.insert(self.manuf, Element::String(dev.manuf.to_string()));
        el.insert(self.first_time, Element::U64(dev.first_time));
        el.insert(self.last_time, Element::U64(dev.last_time));
        el.insert(self.packets, Element::U64(dev.packets));
        el.insert(self.data_packets, Element::U64(dev.data_packets));
        el.insert(self.datasize, Element::U64(dev.datasize));
        el.insert(self.channel, Element::String(dev.channel.clone()));
        el.insert(self.frequency, Element::U16(dev.frequency));

        let mut sig = Element::map();
        sig.insert(self.sig_last, Element::I32(dev.signal.last_signal_dbm as i32));
        sig.insert(self.sig_min, Element::I32(dev.signal.min_signal_dbm as i32));
        sig.insert(self.sig_max, Element::I32(dev.signal.max_signal_dbm as i32));
        el.insert(self.signal, sig);

        if let Some(d11) = dev.dot11() {
            el.insert(self.dot11, self.dot11_fields.to_element(d11));
        }

        el
    }
}
