// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Chain stages that turn raw frames into classified 802.11 traffic: the
//! dissector (LLCDISSECT) attaches `Dot11PackInfo`, the classifier
//! (CLASSIFIER) attaches the common summary, maintains the duplicate ring,
//! and raises the stateless alerts.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::{
    alerts::AlertTracker,
    models::{
        dot11::header::{FrameType, MgmtSubtype},
        ppi::{DLT_IEEE802_11, DLT_PPI, PpiField, decode_ppi},
    },
    packet::{
        chain::ChainHandler,
        components::{Checksum, CommonInfo, DataPayload, DecapChunk, L1Radio},
        frame::{ComponentId, Frame},
    },
    phy80211::{
        alert_names,
        packinfo::{Dot11PackInfo, dissect},
    },
};

/// Ring of recently seen packet hashes for duplicate suppression.
pub const DEDUP_RING_SIZE: usize = 2048;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// LLCDISSECT stage: decode the 802.11 frame (unwrapping PPI capture
/// encapsulation when present) and attach the packinfo component.
pub struct Dot11Dissector {
    comp_dot11: ComponentId,
    comp_decap: ComponentId,
    comp_data: ComponentId,
    comp_l1: ComponentId,
}

impl Dot11Dissector {
    pub fn new(
        comp_dot11: ComponentId,
        comp_decap: ComponentId,
        comp_data: ComponentId,
        comp_l1: ComponentId,
    ) -> Self {
        Self { comp_dot11, comp_decap, comp_data, comp_l1 }
    }
}

impl ChainHandler for Dot11Dissector {
    fn name(&self) -> &'static str {
        "dot11_dissector"
    }

    fn handle(&self, frame: &mut Frame) -> i32 {
        let (payload, payload_offset) = match frame.dlt {
            DLT_IEEE802_11 => (frame.data.to_vec(), 0usize),
            DLT_PPI => match decode_ppi(&frame.data) {
                Ok(ppi) => {
                    let offset = frame.data.len() - ppi.payload.len();

                    if !frame.has(self.comp_l1) {
                        for f in &ppi.fields {
                            if let PpiField::Common(c) = f {
                                let _ = frame.insert(
                                    self.comp_l1,
                                    L1Radio {
                                        signal_dbm: c.signal_dbm,
                                        noise_dbm: c.noise_dbm,
                                        freq_mhz: c.freq_mhz,
                                        datarate_500kbps: c.rate,
                                        tsf_timer: c.tsf_timer,
                                    },
                                );
                                break;
                            }
                        }
                    }

                    (ppi.payload, offset)
                },
                Err(_) => {
                    frame.error = true;
                    return 0;
                },
            },
            _ => return 0,
        };

        match dissect(&payload) {
            Ok(info) => {
                if let Some(h) = &info.header {
                    let _ = frame.insert(
                        self.comp_decap,
                        DecapChunk {
                            offset: payload_offset + h.body_offset,
                            length: payload.len().saturating_sub(h.body_offset),
                            ethertype: 0,
                        },
                    );
                }

                if let Some(eapol) = &info.eapol {
                    let _ = frame
                        .insert(self.comp_data, DataPayload::Eapol(eapol.clone()));
                }

                let _ = frame.insert(self.comp_dot11, info);
            },
            Err(_) => {
                frame.error = true;
            },
        }

        0
    }
}

struct DedupRing {
    seen: HashSet<u32>,
    order: VecDeque<u32>,
}

impl DedupRing {
    fn new() -> Self {
        Self {
            seen: HashSet::with_capacity(DEDUP_RING_SIZE),
            order: VecDeque::with_capacity(DEDUP_RING_SIZE),
        }
    }

    /// Records the hash; true when it was already in the ring.
    fn check_and_insert(&mut self, hash: u32) -> bool {
        if self.seen.contains(&hash) {
            return true;
        }

        if self.order.len() == DEDUP_RING_SIZE
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }

        self.order.push_back(hash);
        self.seen.insert(hash);
        false
    }
}

/// CLASSIFIER stage: duplicate detection, common-info summary, and the
/// alerts that need no device state.
pub struct Dot11Classifier {
    comp_dot11: ComponentId,
    comp_common: ComponentId,
    comp_l1: ComponentId,
    comp_checksum: ComponentId,
    phy_id: u32,
    alerts: Arc<AlertTracker>,
    dedup: Mutex<DedupRing>,
}

impl Dot11Classifier {
    pub fn new(
        comp_dot11: ComponentId,
        comp_common: ComponentId,
        comp_l1: ComponentId,
        comp_checksum: ComponentId,
        phy_id: u32,
        alerts: Arc<AlertTracker>,
    ) -> Self {
        Self {
            comp_dot11,
            comp_common,
            comp_l1,
            comp_checksum,
            phy_id,
            alerts,
            dedup: Mutex::new(DedupRing::new()),
        }
    }

    fn raise_stateless_alerts(&self, info: &Dot11PackInfo) {
        let source = info.source();
        let bssid = info.bssid();

        if info.ssid_oversize {
            self.alerts.raise(
                alert_names::LONG_SSID,
                Some(source),
                None,
                format!(
                    "SSID of illegal length {} advertised by {source}",
                    info.ssid.as_ref().map(|s| s.raw.len()).unwrap_or(0)
                ),
            );
        }

        if info.mgmt_subtype() == Some(MgmtSubtype::ProbeResp)
            && info.ssid.as_ref().is_some_and(|s| s.raw.is_empty())
        {
            self.alerts.raise(
                alert_names::NULL_PROBE_RESP,
                Some(source),
                None,
                format!("zero-length SSID probe response from {source}"),
            );
        }

        if matches!(
            info.mgmt_subtype(),
            Some(MgmtSubtype::Deauth) | Some(MgmtSubtype::Disassoc)
        ) && let Some(reason) = info.reason_code
            && (reason == 0 || reason > 66)
        {
            self.alerts.raise(
                alert_names::INVALID_DEAUTH_REASON,
                Some(source),
                None,
                format!("deauth/disassoc with invalid reason code {reason}"),
            );
        }

        if let (Some(country), Some(channel)) = (&info.country, info.channel)
            && !country.triplets.is_empty()
            && !country.allows_channel(channel)
        {
            self.alerts.raise(
                alert_names::DOT11D_MISMATCH,
                Some(bssid),
                None,
                format!(
                    "advertised channel {channel} outside 802.11d country {} \
                     channel ranges",
                    country.country_code
                ),
            );
        }
    }
}

impl ChainHandler for Dot11Classifier {
    fn name(&self) -> &'static str {
        "dot11_classifier"
    }

    fn handle(&self, frame: &mut Frame) -> i32 {
        let Some(info) = frame.get_arc::<Dot11PackInfo>(self.comp_dot11) else {
            return 0;
        };

        let hash = CRC32.checksum(&frame.data);
        let dup = self
            .dedup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .check_and_insert(hash);
        if dup {
            frame.duplicate = true;
        }

        // Capture sources drop bad-FCS frames upstream; anything reaching
        // the classifier hashes as valid.
        let _ = frame.insert(
            self.comp_checksum,
            Checksum { checksum: hash, valid: true },
        );

        let Some(header) = &info.header else {
            return 0;
        };

        let _ = frame.insert(
            self.comp_common,
            CommonInfo {
                phy_id: self.phy_id,
                source: header.source,
                dest: header.dest,
                network: header.bssid,
                channel: info
                    .channel
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                freq_mhz: frame
                    .get::<L1Radio>(self.comp_l1)
                    .map(|r| r.freq_mhz)
                    .unwrap_or(0),
            },
        );

        if header.frame_type == FrameType::Management && !frame.duplicate {
            self.raise_stateless_alerts(&info);
        }

        0
    }
}
