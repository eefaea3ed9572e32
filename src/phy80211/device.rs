// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-device 802.11 state: roles, SSID records, client relationships, and
//! handshake capture.

use std::collections::{HashMap, VecDeque};

use bitflags::bitflags;
use bytes::Bytes;

use crate::{
    devices::key::DeviceKey,
    models::{
        dot11::{eapol::HandshakeDirection, ie::IeOrderEntry, rsn::CryptSet},
        elements::{Element, FieldRegistry},
        mac::MacAddr,
    },
};

/// Handshake frames kept per device; oldest evicted first.
pub const WPA_KEY_VEC_CAP: usize = 16;

bitflags! {
    /// Observed roles; a device accumulates bits and never loses them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dot11TypeSet: u32 {
        const BEACON_AP         = 1 << 0;
        const PROBE_AP          = 1 << 1;
        const CLIENT            = 1 << 2;
        const ADHOC             = 1 << 3;
        const WIRED_BRIDGED     = 1 << 4;
        const INFERRED_WIRELESS = 1 << 5;
    }
}

/// SSID as advertised by beacons and probe responses, keyed by the IE tag
/// checksum so distinct IE layouts become distinct records.
#[derive(Debug, Clone, Default)]
pub struct AdvertisedSsid {
    /// Original SSID bytes; may contain nulls.
    pub ssid_raw: Vec<u8>,
    /// Sanitized printable form.
    pub ssid: String,
    /// Length of the original bytes, independent of sanitizing.
    pub ssid_len: u32,
    pub first_time: u64,
    pub last_time: u64,
    pub ssid_beacon: bool,
    pub ssid_probe_response: bool,
    pub channel: String,
    pub ht_center_mhz: u32,
    pub vht_center0_mhz: u32,
    pub vht_center1_mhz: u32,
    pub crypt_set: CryptSet,
    /// Advertised beacon rate, beacons per second.
    pub beacon_rate: u32,
    /// Beacons seen in the current one-second window.
    pub beacons_sec: u32,
    pub maxrate_mbps: f64,
    pub dot11d_country: String,
    /// (first channel, num channels, max power) runs from the country IE.
    pub dot11d_ranges: Vec<(u8, u8, i8)>,
    pub wps_version: u8,
    pub wps_state: u8,
    pub wps_device_name: String,
    pub wps_manufacturer: String,
    pub wps_model: String,
    pub qbss_stations: u16,
    pub qbss_utilization: u8,
    pub dot11r_mobility: bool,
    pub dot11r_mobility_domain: u16,
    pub ie_order: Vec<IeOrderEntry>,
}

/// SSIDs a client probed for, keyed by probe checksum.
#[derive(Debug, Clone, Default)]
pub struct ProbedSsid {
    pub ssid_raw: Vec<u8>,
    pub ssid: String,
    pub ssid_len: u32,
    pub first_time: u64,
    pub last_time: u64,
    pub crypt_set: CryptSet,
}

/// Client-side record of an association, held on the client device and
/// keyed by BSSID.
#[derive(Debug, Clone, Default)]
pub struct Dot11Client {
    pub bssid: MacAddr,
    pub bssid_key: Option<DeviceKey>,
    pub first_time: u64,
    pub last_time: u64,
    pub client_type: Dot11TypeSet,
    pub dhcp_host: String,
    pub dhcp_vendor: String,
    pub tx_crypt_set: CryptSet,
    pub rx_crypt_set: CryptSet,
    pub eap_identity: String,
    pub cdp_device: String,
    pub cdp_port: String,
    pub bytes: u64,
    pub retries: u64,
    pub fragments: u64,
}

/// One captured 4-way handshake frame.
#[derive(Debug, Clone)]
pub struct EapolRecord {
    pub ts_us: u64,
    pub direction: HandshakeDirection,
    pub message_num: u8,
    pub replay_counter: u64,
    pub install: bool,
    pub nonce: [u8; 32],
    /// Raw frame bytes so a handshake pcap can be reconstructed.
    pub frame: Bytes,
}

/// BSS timestamp validation state for spoof detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsstsState {
    pub last_ts: u64,
    pub last_pkt_time_us: u64,
    pub incident_score: u32,
}

/// WPS M3 flood window.
#[derive(Debug, Clone, Copy, Default)]
pub struct WpsM3Window {
    pub window_start: u64,
    pub count: u32,
}

/// The 802.11 child record of a tracked device.
#[derive(Debug, Clone, Default)]
pub struct Dot11Device {
    pub type_set: Dot11TypeSet,
    pub advertised_ssids: HashMap<u32, AdvertisedSsid>,
    pub probed_ssids: HashMap<u32, ProbedSsid>,
    /// MAC → device key of clients associated to this AP.
    pub associated_clients: HashMap<MacAddr, DeviceKey>,
    /// BSSID → association record when this device acts as a client.
    pub client_map: HashMap<MacAddr, Dot11Client>,
    pub wpa_key_vec: VecDeque<EapolRecord>,
    /// OR of `1 << message_num` for captured handshake frames.
    pub wpa_present_handshake: u8,
    pub fingerprint_beacon: u32,
    pub fingerprint_probe: u32,
    pub fingerprint_response: u32,
    pub wps_m3: WpsM3Window,
    pub bssts: BsstsState,
    /// Last observed TSF value from a beacon.
    pub bss_timestamp: u64,
    pub last_sequence: u16,
}

impl Dot11Device {
    /// Appends a handshake frame, evicting the oldest past the cap.
    pub fn record_eapol(&mut self, rec: EapolRecord) {
        if rec.message_num >= 1 && rec.message_num <= 4 {
            self.wpa_present_handshake |= 1 << rec.message_num;
        }

        if self.wpa_key_vec.len() == WPA_KEY_VEC_CAP {
            self.wpa_key_vec.pop_front();
        }
        self.wpa_key_vec.push_back(rec);
    }

    /// True when a duplicate nonce appears under a different replay
    /// counter, the signature of a KRACK-style replay. Only frames with
    /// the same message number compare; M3 legitimately repeats the M1
    /// nonce under a fresh counter.
    pub fn nonce_duplicated(
        &self,
        message_num: u8,
        nonce: &[u8; 32],
        replay_counter: u64,
    ) -> bool {
        self.wpa_key_vec.iter().any(|r| {
            r.message_num == message_num
                && &r.nonce == nonce
                && r.replay_counter != replay_counter
        })
    }

    /// Rotates the per-second beacon counters; driven by the timer sweep.
    pub fn rotate_beacon_counters(&mut self) {
        for ssid in self.advertised_ssids.values_mut() {
            ssid.beacons_sec = 0;
        }
    }
}

/// Field ids for the dot11 child record, registered once at startup.
pub struct Dot11Fields {
    type_set: u16,
    advertised: u16,
    probed: u16,
    num_clients: u16,
    ssid: u16,
    ssid_len: u16,
    ssid_beacon: u16,
    ssid_probe_response: u16,
    channel: u16,
    crypt_set: u16,
    beacons_sec: u16,
    beacon_rate: u16,
    maxrate: u16,
    country: u16,
    first_time: u16,
    last_time: u16,
    handshake_mask: u16,
    handshake_frames: u16,
    fp_beacon: u16,
    fp_probe: u16,
    fp_response: u16,
}

impl Dot11Fields {
    pub fn register(reg: &FieldRegistry) -> Self {
        Self {
            type_set: reg.register("dot11.device.type_set", "observed role bitmask"),
            advertised: reg
                .register("dot11.device.advertised_ssid_map", "advertised SSIDs"),
            probed: reg.register("dot11.device.probed_ssid_map", "probed SSIDs"),
            num_clients: reg
                .register("dot11.device.num_associated_clients", "client count"),
            ssid: reg.register("dot11.advertisedssid.ssid", "SSID name"),
            ssid_len: reg
                .register("dot11.advertisedssid.ssidlen", "SSID byte length"),
            ssid_beacon: reg
                .register("dot11.advertisedssid.beacon", "advertised via beacon"),
            ssid_probe_response: reg.register(
                "dot11.advertisedssid.probe_response",
                "advertised via probe response",
            ),
            channel: reg.register("dot11.advertisedssid.channel", "channel"),
            crypt_set: reg.register(
                "dot11.advertisedssid.crypt_set",
                "encryption bitfield",
            ),
            beacons_sec: reg.register(
                "dot11.advertisedssid.beacons_sec",
                "beacons in the last second",
            ),
            beacon_rate: reg
                .register("dot11.advertisedssid.beaconrate", "beacon rate"),
            maxrate: reg.register("dot11.advertisedssid.maxrate", "max rate"),
            country: reg
                .register("dot11.advertisedssid.dot11d_country", "802.11d country"),
            first_time: reg
                .register("dot11.advertisedssid.first_time", "first seen"),
            last_time: reg.register("dot11.advertisedssid.last_time", "last seen"),
            handshake_mask: reg.register(
                "dot11.device.wpa_present_handshake",
                "handshake messages seen",
            ),
            handshake_frames: reg
                .register("dot11.device.wpa_handshake_count", "handshake frames"),
            fp_beacon: reg
                .register("dot11.device.beacon_fingerprint", "beacon IE fingerprint"),
            fp_probe: reg
                .register("dot11.device.probe_fingerprint", "probe IE fingerprint"),
            fp_response: reg.register(
                "dot11.device.response_fingerprint",
                "probe response IE fingerprint",
            ),
        }
    }

    fn ssid_element(&self, ssid: &AdvertisedSsid) -> Element {
        let mut el = Element::map();
        el.insert(self.ssid, Element::String(ssid.ssid.clone()));
        el.insert(self.ssid_len, Element::U32(ssid.ssid_len));
        el.insert(self.ssid_beacon, Element::Bool(ssid.ssid_beacon));
        el.insert(
            self.ssid_probe_response,
            Element::Bool(ssid.ssid_probe_response),
        );
        el.insert(self.channel, Element::String(ssid.channel.clone()));
        el.insert(self.crypt_set, Element::U64(ssid.crypt_set.bits()));
        el.insert(self.beacons_sec, Element::U32(ssid.beacons_sec));
        el.insert(self.beacon_rate, Element::U32(ssid.beacon_rate));
        el.insert(self.maxrate, Element::Double(ssid.maxrate_mbps));
        el.insert(self.country, Element::String(ssid.dot11d_country.clone()));
        el.insert(self.first_time, Element::U64(ssid.first_time));
        el.insert(self.last_time, Element::U64(ssid.last_time));
        el
    }

    pub fn to_element(&self, dev: &Dot11Device) -> Element {
        let mut el = Element::map();
        el.insert(self.type_set, Element::U32(dev.type_set.bits()));

        let advertised: Vec<Element> = dev
            .advertised_ssids
            .values()
            .map(|s| self.ssid_element(s))
            .collect();
        el.insert(self.advertised, Element::Vector(advertised));

        let probed: Vec<Element> = dev
            .probed_ssids
            .values()
            .map(|p| {
                let mut pe = Element::map();
                pe.insert(self.ssid, Element::String(p.ssid.clone()));
                pe.insert(self.ssid_len, Element::U32(p.ssid_len));
                pe.insert(self.first_time, Element::U64(p.first_time));
                pe.insert(self.last_time, Element::U64(p.last_time));
                pe
            })
            .collect();
        el.insert(self.probed, Element::Vector(probed));

        el.insert(
            self.num_clients,
            Element::U32(dev.associated_clients.len() as u32),
        );
        el.insert(
            self.handshake_mask,
            Element::U8(dev.wpa_present_handshake),
        );
        el.insert(
            self.handshake_frames,
            Element::U32(dev.wpa_key_vec.len() as u32),
        );
        el.insert(self.fp_beacon, Element::U32(dev.fingerprint_beacon));
        el.insert(self.fp_probe, Element::U32(dev.fingerprint_probe));
        el.insert(self.fp_response, Element::U32(dev.fingerprint_response));
        el
    }
}
