// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TRACKER stage: folds classified 802.11 frames into the device model and
//! runs the stateful alerts (BSS timestamp spoofing, WPS floods, handshake
//! nonce anomalies).

use std::sync::Arc;

use crate::{
    alerts::AlertTracker,
    devices::{key::DeviceKey, tracker::DeviceTracker},
    lookups::oui::OuiTracker,
    models::dot11::{
        eapol::{EapolFrame, HandshakeDirection},
        header::{FrameType, MgmtSubtype},
    },
    packet::{
        chain::ChainHandler,
        components::{GpsFix, L1Radio},
        frame::{ComponentId, Frame},
    },
    phy80211::{
        alert_names,
        device::{AdvertisedSsid, Dot11Device, Dot11TypeSet, EapolRecord, ProbedSsid},
        packinfo::Dot11PackInfo,
    },
};

/// Wall-clock gap that resets the BSS timestamp baseline.
const BSSTS_QUIET_US: u64 = 1_500_000;
/// TSF regression slack before a beacon counts as a strike.
const BSSTS_SLACK_US: u64 = 500_000;
/// Score added per regression strike.
const BSSTS_STRIKE_SCORE: u32 = 5;

/// WPS M3 window length.
const WPS_M3_WINDOW_SECS: u64 = 60;

pub struct Dot11TrackerOptions {
    /// Cumulative incident score that raises the spoof alert. The default
    /// corresponds to three strikes inside the validity window.
    pub bssts_threshold: u32,
    /// WPS M3 frames per BSSID per minute before the brute-force alert.
    pub wps_m3_threshold: u32,
}

impl Default for Dot11TrackerOptions {
    fn default() -> Self {
        Self {
            bssts_threshold: 3 * BSSTS_STRIKE_SCORE,
            wps_m3_threshold: 5,
        }
    }
}

pub struct Dot11TrackerStage {
    comp_dot11: ComponentId,
    comp_l1: ComponentId,
    comp_gps: ComponentId,
    phy_id: u32,
    phy_name: Arc<str>,
    devices: Arc<DeviceTracker>,
    oui: Arc<OuiTracker>,
    alerts: Arc<AlertTracker>,
    opts: Dot11TrackerOptions,
}

impl Dot11TrackerStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comp_dot11: ComponentId,
        comp_l1: ComponentId,
        comp_gps: ComponentId,
        phy_id: u32,
        phy_name: Arc<str>,
        devices: Arc<DeviceTracker>,
        oui: Arc<OuiTracker>,
        alerts: Arc<AlertTracker>,
        opts: Dot11TrackerOptions,
    ) -> Self {
        Self {
            comp_dot11,
            comp_l1,
            comp_gps,
            phy_id,
            phy_name,
            devices,
            oui,
            alerts,
            opts,
        }
    }

    fn key(&self, mac: crate::models::mac::MacAddr) -> DeviceKey {
        DeviceKey::new(self.phy_id, mac)
    }

    /// Updates base counters shared by every frame the device sent.
    fn touch_base(
        &self,
        dev: &mut crate::devices::base::TrackedDevice,
        frame: &Frame,
        info: &Dot11PackInfo,
        l1: Option<L1Radio>,
        gps: Option<GpsFix>,
    ) {
        let now = frame.ts_us / 1_000_000;

        dev.last_time = now;
        dev.packets += 1;
        dev.datasize += frame.data.len() as u64;

        if frame.error {
            dev.error_packets += 1;
        }

        if let Some(h) = &info.header
            && h.frame_type == FrameType::Data
        {
            dev.data_packets += 1;
        }

        if let Some(c) = info.channel {
            dev.channel = c.to_string();
        }

        if let Some(l1) = l1 {
            dev.signal.observe(l1.signal_dbm, l1.noise_dbm, l1.freq_mhz);
            if l1.freq_mhz != 0 {
                dev.frequency = l1.freq_mhz;
            }
        }

        if let Some(fix) = gps {
            dev.gps.observe(fix);
        }
    }

    fn update_advertised_ssid(
        &self,
        d11: &mut Dot11Device,
        info: &Dot11PackInfo,
        now: u64,
        beacon: bool,
    ) {
        let Some(ssid) = &info.ssid else {
            return;
        };

        let entry = d11
            .advertised_ssids
            .entry(info.ietag_csum)
            .or_insert_with(|| AdvertisedSsid {
                ssid_raw: ssid.raw.clone(),
                ssid: ssid.printable.clone(),
                ssid_len: ssid.raw.len() as u32,
                first_time: now,
                ..Default::default()
            });

        entry.last_time = now;

        if beacon {
            entry.ssid_beacon = true;
            entry.beacons_sec += 1;
            if let Some(fixed) = &info.beacon {
                entry.beacon_rate = fixed.beacon_rate();
            }
        } else {
            entry.ssid_probe_response = true;
        }

        if let Some(c) = info.channel {
            entry.channel = c.to_string();
        }
        if let Some(ht) = &info.ht {
            entry.ht_center_mhz = ht.center_mhz();
        }
        if let Some(vht) = &info.vht {
            entry.vht_center0_mhz = vht.center0_mhz();
            entry.vht_center1_mhz = vht.center1_mhz();
        }

        entry.crypt_set |= info.crypt_set;

        let mut maxrate: f64 = entry.maxrate_mbps;
        if let Some(r) = &info.rates {
            maxrate = maxrate.max(r.max_rate_mbps());
        }
        if let Some(r) = &info.ext_rates {
            maxrate = maxrate.max(r.max_rate_mbps());
        }
        entry.maxrate_mbps = maxrate;

        if let Some(country) = &info.country {
            entry.dot11d_country = country.country_code.clone();
            entry.dot11d_ranges = country
                .triplets
                .iter()
                .map(|t| (t.first_channel, t.num_channels, t.max_power_dbm))
                .collect();
        }

        if let Some(wps) = &info.wps {
            entry.wps_version = wps.version;
            entry.wps_state = wps.state;
            entry.wps_device_name = wps.device_name.clone();
            entry.wps_manufacturer = wps.manufacturer.clone();
            entry.wps_model = wps.model_name.clone();
        }

        if let Some(qbss) = &info.qbss {
            entry.qbss_stations = qbss.station_count;
            entry.qbss_utilization = qbss.channel_utilization;
        }

        if let Some(mob) = &info.mobility {
            entry.dot11r_mobility = true;
            entry.dot11r_mobility_domain = mob.mobility_domain;
        }

        entry.ie_order = info.ie_order.clone();
    }

    /// BSS timestamp spoof machine. The baseline tracks the last credible
    /// TSF and freezes during an incident so a spoofed clock cannot
    /// re-baseline itself; the observed value is always retained on the
    /// device record.
    fn check_bssts(
        &self,
        d11: &mut Dot11Device,
        info: &Dot11PackInfo,
        ts_us: u64,
        bssid: crate::models::mac::MacAddr,
    ) {
        let Some(fixed) = &info.beacon else {
            return;
        };
        let new_ts = fixed.timestamp;

        let st = &mut d11.bssts;
        let elapsed = ts_us.saturating_sub(st.last_pkt_time_us);

        if st.last_pkt_time_us == 0 || elapsed > BSSTS_QUIET_US {
            // Legitimate quiet period; accept the new timeline.
            st.last_ts = new_ts;
            st.incident_score = 0;
        } else if new_ts + BSSTS_SLACK_US < st.last_ts {
            st.incident_score += BSSTS_STRIKE_SCORE;

            if st.incident_score >= self.opts.bssts_threshold {
                self.alerts.raise(
                    alert_names::BSS_TIMESTAMP,
                    Some(bssid),
                    None,
                    format!(
                        "BSS {bssid} timestamp regressed from {} to {new_ts}, \
                         possible AP spoofing",
                        st.last_ts
                    ),
                );
                st.incident_score = 0;
                st.last_ts = new_ts;
            }
        } else {
            if st.incident_score > 0 {
                st.incident_score -= 1;
            }
            st.last_ts = new_ts;
        }

        st.last_pkt_time_us = ts_us;
        d11.bss_timestamp = new_ts;
    }

    fn check_wps_m3(
        &self,
        d11: &mut Dot11Device,
        now: u64,
        bssid: crate::models::mac::MacAddr,
    ) {
        let w = &mut d11.wps_m3;

        if now.saturating_sub(w.window_start) > WPS_M3_WINDOW_SECS {
            w.window_start = now;
            w.count = 0;
        }

        w.count += 1;

        if w.count == self.opts.wps_m3_threshold {
            self.alerts.raise(
                alert_names::WPS_BRUTE,
                Some(bssid),
                None,
                format!(
                    "{} WPS M3 exchanges with {bssid} inside a minute, likely \
                     WPS PIN brute force",
                    w.count
                ),
            );
        }
    }

    fn record_handshake(
        &self,
        frame: &Frame,
        info: &Dot11PackInfo,
        key: &crate::models::dot11::eapol::EapolKey,
    ) {
        let Some(header) = &info.header else {
            return;
        };

        // The handshake lives on the client participant.
        let client_mac = match key.direction {
            HandshakeDirection::FromAp => header.dest,
            HandshakeDirection::FromClient => header.source,
        };
        if client_mac.is_multicast() {
            return;
        }

        let manuf = self.oui.lookup(client_mac);
        let (handle, _) = self.devices.get_or_create(
            self.key(client_mac),
            Arc::clone(&self.phy_name),
            manuf,
        );

        handle.write(|dev| {
            let d11 = dev.dot11_mut();

            if key.nonce_is_zero() && key.message_num != 4 {
                self.alerts.raise(
                    alert_names::NONCE_ZERO,
                    Some(client_mac),
                    Some(header.bssid),
                    format!(
                        "EAPOL M{} with all-zero nonce between {client_mac} and {}",
                        key.message_num, header.bssid
                    ),
                );
            } else if key.message_num != 0
                && !key.nonce_is_zero()
                && d11.nonce_duplicated(
                    key.message_num,
                    &key.nonce,
                    key.replay_counter,
                )
            {
                self.alerts.raise(
                    alert_names::NONCE_DUPLICATE,
                    Some(client_mac),
                    Some(header.bssid),
                    format!(
                        "EAPOL nonce reused across replay counters between \
                         {client_mac} and {}",
                        header.bssid
                    ),
                );
                // Prune the colliding entries so the vector reflects the
                // most recent handshake attempt.
                d11.wpa_key_vec.retain(|r| r.nonce != key.nonce);
            }

            d11.record_eapol(EapolRecord {
                ts_us: frame.ts_us,
                direction: key.direction,
                message_num: key.message_num,
                replay_counter: key.replay_counter,
                install: key.install,
                nonce: key.nonce,
                frame: frame.data.clone(),
            });
        });
    }
}

impl ChainHandler for Dot11TrackerStage {
    fn name(&self) -> &'static str {
        "dot11_tracker"
    }

    fn handle(&self, frame: &mut Frame) -> i32 {
        let Some(info) = frame.get_arc::<Dot11PackInfo>(self.comp_dot11) else {
            return 0;
        };
        let Some(header) = info.header.clone() else {
            return 0;
        };

        let l1 = frame.get::<L1Radio>(self.comp_l1).copied();
        let gps = frame.get::<GpsFix>(self.comp_gps).copied();

        let source = header.source;
        let bssid = header.bssid;
        let now = frame.ts_us / 1_000_000;

        if source.is_multicast() || source.is_zero() {
            return 0;
        }

        let manuf = self.oui.lookup(source);
        let (handle, _) = self.devices.get_or_create(
            self.key(source),
            Arc::clone(&self.phy_name),
            manuf,
        );

        handle.write(|dev| {
            self.touch_base(dev, frame, &info, l1, gps);

            let d11 = dev.dot11_mut();
            d11.last_sequence = header.sequence;

            match header.frame_type {
                FrameType::Management => match header.mgmt_subtype() {
                    Some(MgmtSubtype::Beacon) => {
                        if info.beacon.as_ref().is_some_and(|b| b.ibss()) {
                            d11.type_set |= Dot11TypeSet::ADHOC;
                        } else {
                            d11.type_set |= Dot11TypeSet::BEACON_AP;
                        }
                        d11.fingerprint_beacon = info.ietag_csum;
                        self.update_advertised_ssid(d11, &info, now, true);
                        self.check_bssts(d11, &info, frame.ts_us, source);
                    },
                    Some(MgmtSubtype::ProbeResp) => {
                        d11.type_set |= Dot11TypeSet::PROBE_AP;
                        d11.fingerprint_response = info.ietag_csum;
                        self.update_advertised_ssid(d11, &info, now, false);
                    },
                    Some(MgmtSubtype::ProbeReq) => {
                        d11.type_set |= Dot11TypeSet::CLIENT;
                        d11.fingerprint_probe = info.ietag_csum;

                        if let Some(ssid) = &info.ssid
                            && !ssid.raw.is_empty()
                        {
                            let entry = d11
                                .probed_ssids
                                .entry(info.ietag_csum)
                                .or_insert_with(|| ProbedSsid {
                                    ssid_raw: ssid.raw.clone(),
                                    ssid: ssid.printable.clone(),
                                    ssid_len: ssid.raw.len() as u32,
                                    first_time: now,
                                    ..Default::default()
                                });
                            entry.last_time = now;
                            entry.crypt_set |= info.crypt_set;
                        }
                    },
                    _ => {},
                },
                FrameType::Data => {
                    if header.to_ds && header.from_ds {
                        d11.type_set |= Dot11TypeSet::WIRED_BRIDGED;
                    } else if header.to_ds {
                        d11.type_set |= Dot11TypeSet::CLIENT;
                    }

                    if header.is_null_data() && d11.type_set.is_empty() {
                        d11.type_set |= Dot11TypeSet::INFERRED_WIRELESS;
                    }
                },
                _ => {},
            }
        });

        // Client relationship: the transmitter is a client of the BSS when
        // it isn't the BSS itself.
        if !bssid.is_zero()
            && !bssid.is_multicast()
            && bssid != source
        {
            let bssid_manuf = self.oui.lookup(bssid);
            let (bssid_handle, _) = self.devices.get_or_create(
                self.key(bssid),
                Arc::clone(&self.phy_name),
                bssid_manuf,
            );

            let source_key = self.key(source);
            let bssid_key = self.key(bssid);

            bssid_handle.write(|ap| {
                ap.dot11_mut()
                    .associated_clients
                    .insert(source, source_key);
            });

            handle.write(|dev| {
                let d11 = dev.dot11_mut();
                let client = d11.client_map.entry(bssid).or_default();

                if client.first_time == 0 {
                    client.first_time = now;
                }
                client.last_time = now;
                client.bssid = bssid;
                client.bssid_key = Some(bssid_key);
                client.client_type = d11.type_set;
                client.bytes += frame.data.len() as u64;
                client.tx_crypt_set |= info.crypt_set;

                if header.retry {
                    client.retries += 1;
                }
                if header.more_fragments {
                    client.fragments += 1;
                }
            });
        }

        match &info.eapol {
            Some(EapolFrame::Key(key)) => self.record_handshake(frame, &info, key),
            Some(EapolFrame::WpsMessage(3)) => {
                if !bssid.is_multicast() && !bssid.is_zero() {
                    let bssid_manuf = self.oui.lookup(bssid);
                    let (bssid_handle, _) = self.devices.get_or_create(
                        self.key(bssid),
                        Arc::clone(&self.phy_name),
                        bssid_manuf,
                    );
                    bssid_handle
                        .write(|ap| self.check_wps_m3(ap.dot11_mut(), now, bssid));
                }
            },
            _ => {},
        }

        0
    }
}
