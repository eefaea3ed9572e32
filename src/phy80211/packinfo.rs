// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The `dot11_packinfo` component: everything the dissector learned about
//! one 802.11 frame, attached at LLCDISSECT and consumed by the classifier
//! and tracker stages.

use crate::models::{
    dot11::{
        country::{CountryIe, parse_country},
        eapol::{EapolFrame, is_eapol, parse_eapol, parse_llc_snap},
        header::{
            BEACON_FIXED_LEN, BeaconFixed, Dot11Header, FrameType, MgmtSubtype,
            Truncated, decode_beacon_fixed, decode_header,
        },
        ht_vht::{
            HtOperationIe, VhtOperationIe, parse_ht_operation, parse_vht_operation,
        },
        ie::{
            self, IeOrderEntry, walk_ies,
        },
        rsn::{CryptSet, RsnIe, parse_rsn},
        tags::{
            MobilityDomainIe, PowerCapabilityIe, QbssIe, RatesIe, SsidIe,
            parse_ds_channel, parse_mobility_domain, parse_power_capability,
            parse_qbss, parse_rates, parse_ssid, parse_supported_channels,
        },
        vendor::{
            DJI_OUI, DroneIdIe, MICROSOFT_OUI, WPA1_SUBTYPE, WPS_SUBTYPE, WpaIe,
            WpsIe, parse_droneid, parse_wpa, parse_wps,
        },
    },
    mac::MacAddr,
};

/// Distilled view of one 802.11 frame.
#[derive(Debug, Clone, Default)]
pub struct Dot11PackInfo {
    pub header: Option<Dot11Header>,
    pub beacon: Option<BeaconFixed>,

    pub ssid: Option<SsidIe>,
    /// Raw SSID length exceeded the protocol maximum.
    pub ssid_oversize: bool,
    pub channel: Option<u8>,
    pub rates: Option<RatesIe>,
    pub ext_rates: Option<RatesIe>,
    pub country: Option<CountryIe>,
    pub ht: Option<HtOperationIe>,
    pub vht: Option<VhtOperationIe>,
    pub rsn: Option<RsnIe>,
    pub wpa: Option<WpaIe>,
    pub wps: Option<WpsIe>,
    pub mobility: Option<MobilityDomainIe>,
    pub qbss: Option<QbssIe>,
    pub droneid: Option<DroneIdIe>,
    pub power: Option<PowerCapabilityIe>,
    pub supported_channels: Option<Vec<u8>>,

    /// Adler32 fingerprint over the IE tag-number/length stream.
    pub ietag_csum: u32,
    pub ie_order: Vec<IeOrderEntry>,
    /// Individual tag parse failures; the frame itself stays valid.
    pub tag_errors: Vec<String>,
    pub ie_truncated: bool,

    pub crypt_set: CryptSet,
    pub eapol: Option<EapolFrame>,
    /// Deauth/disassoc reason code.
    pub reason_code: Option<u16>,
}

impl Dot11PackInfo {
    pub fn bssid(&self) -> MacAddr {
        self.header.as_ref().map(|h| h.bssid).unwrap_or_default()
    }

    pub fn source(&self) -> MacAddr {
        self.header.as_ref().map(|h| h.source).unwrap_or_default()
    }

    pub fn mgmt_subtype(&self) -> Option<MgmtSubtype> {
        self.header.as_ref().and_then(Dot11Header::mgmt_subtype)
    }
}

/// IE list offset within the management body per subtype; None means the
/// subtype carries no tagged parameters we walk.
fn ie_offset(subtype: MgmtSubtype) -> Option<usize> {
    match subtype {
        MgmtSubtype::Beacon | MgmtSubtype::ProbeResp => Some(BEACON_FIXED_LEN),
        MgmtSubtype::ProbeReq => Some(0),
        MgmtSubtype::AssocReq => Some(4),
        MgmtSubtype::ReassocReq => Some(10),
        _ => None,
    }
}

/// Dissects a raw 802.11 frame. Fails only on header truncation; tag-level
/// problems are recorded in `tag_errors` on an otherwise valid packinfo.
pub fn dissect(frame: &[u8]) -> Result<Dot11PackInfo, Truncated> {
    let header = decode_header(frame)?;
    let body = &frame[header.body_offset..];

    let mut info = Dot11PackInfo { header: Some(header.clone()), ..Default::default() };

    match header.frame_type {
        FrameType::Management => dissect_mgmt(&header, body, &mut info),
        FrameType::Data => dissect_data(body, &mut info),
        _ => {},
    }

    // Crypt summary: protected data with no advertised cipher suite means
    // static WEP.
    if let Some(rsn) = &info.rsn {
        info.crypt_set |= rsn.crypt_set();
    }
    if let Some(wpa) = &info.wpa {
        info.crypt_set |= wpa.crypt_set();
    }
    if info.wps.is_some() {
        info.crypt_set |= CryptSet::WPS;
    }
    if let Some(beacon) = &info.beacon
        && beacon.privacy()
        && info.rsn.is_none()
        && info.wpa.is_none()
    {
        info.crypt_set |= CryptSet::WEP;
    }

    Ok(info)
}

fn dissect_mgmt(header: &Dot11Header, body: &[u8], info: &mut Dot11PackInfo) {
    let subtype = MgmtSubtype::from_raw(header.subtype_raw);

    if matches!(subtype, MgmtSubtype::Beacon | MgmtSubtype::ProbeResp) {
        match decode_beacon_fixed(body) {
            Ok(fixed) => info.beacon = Some(fixed),
            Err(_) => {
                info.tag_errors.push("truncated beacon fixed parameters".into());
                return;
            },
        }
    }

    if matches!(subtype, MgmtSubtype::Deauth | MgmtSubtype::Disassoc) {
        if body.len() >= 2 {
            info.reason_code = Some(u16::from_le_bytes([body[0], body[1]]));
        } else {
            info.tag_errors.push("truncated reason code".into());
        }
        return;
    }

    let Some(offset) = ie_offset(subtype) else {
        return;
    };
    if body.len() < offset {
        info.tag_errors.push("management body shorter than fixed fields".into());
        return;
    }

    let walk = walk_ies(&body[offset..]);
    info.ietag_csum = walk.tag_csum;
    info.ie_order = walk.order;
    info.ie_truncated = walk.truncated;

    if walk.truncated {
        info.tag_errors.push("IE list truncated".into());
    }

    let mut err = |e: ie::IeError| info.tag_errors.push(e.to_string());

    for tag in &walk.tags {
        match tag.number {
            ie::IE_SSID => {
                info.ssid_oversize = tag.data.len() > 32;
                match parse_ssid(tag.data) {
                    Ok(v) => info.ssid = Some(v),
                    Err(e) => err(e),
                }
            },
            ie::IE_SUPPORTED_RATES => match parse_rates(tag.data) {
                Ok(v) => info.rates = Some(v),
                Err(e) => err(e),
            },
            ie::IE_EXT_RATES => match parse_rates(tag.data) {
                Ok(v) => info.ext_rates = Some(v),
                Err(e) => err(e),
            },
            ie::IE_DS_PARAM => match parse_ds_channel(tag.data) {
                Ok(v) => info.channel = Some(v),
                Err(e) => err(e),
            },
            ie::IE_COUNTRY => match parse_country(tag.data) {
                Ok(v) => info.country = Some(v),
                Err(e) => err(e),
            },
            ie::IE_QBSS => match parse_qbss(tag.data) {
                Ok(v) => info.qbss = Some(v),
                Err(e) => err(e),
            },
            ie::IE_POWER_CAPABILITY => match parse_power_capability(tag.data) {
                Ok(v) => info.power = Some(v),
                Err(e) => err(e),
            },
            ie::IE_SUPPORTED_CHANNELS => match parse_supported_channels(tag.data) {
                Ok(v) => info.supported_channels = Some(v),
                Err(e) => err(e),
            },
            ie::IE_RSN => match parse_rsn(tag.data) {
                Ok(v) => info.rsn = Some(v),
                Err(e) => err(e),
            },
            ie::IE_MOBILITY_DOMAIN => match parse_mobility_domain(tag.data) {
                Ok(v) => info.mobility = Some(v),
                Err(e) => err(e),
            },
            ie::IE_HT_OPERATION => match parse_ht_operation(tag.data) {
                Ok(v) => info.ht = Some(v),
                Err(e) => err(e),
            },
            ie::IE_VHT_OPERATION => match parse_vht_operation(tag.data) {
                Ok(v) => info.vht = Some(v),
                Err(e) => err(e),
            },
            ie::IE_VENDOR => match (tag.vendor_oui(), tag.vendor_subtype()) {
                (Some(MICROSOFT_OUI), Some(WPA1_SUBTYPE)) => {
                    match parse_wpa(&tag.data[4..]) {
                        Ok(v) => info.wpa = Some(v),
                        Err(e) => err(e),
                    }
                },
                (Some(MICROSOFT_OUI), Some(WPS_SUBTYPE)) => {
                    match parse_wps(&tag.data[4..]) {
                        Ok(v) => info.wps = Some(v),
                        Err(e) => err(e),
                    }
                },
                (Some(DJI_OUI), _) => match parse_droneid(&tag.data[3..]) {
                    Ok(v) => info.droneid = Some(v),
                    Err(e) => err(e),
                },
                _ => {},
            },
            _ => {},
        }
    }
}

fn dissect_data(body: &[u8], info: &mut Dot11PackInfo) {
    if !is_eapol(body) {
        return;
    }

    let Some((_, payload)) = parse_llc_snap(body) else {
        return;
    };

    match parse_eapol(payload) {
        Ok(Some(frame)) => info.eapol = Some(frame),
        Ok(None) => {},
        Err(e) => info.tag_errors.push(e.to_string()),
    }
}
