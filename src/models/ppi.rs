// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PPI (Per-Packet Information) framing.
//!
//! Every captured 802.11 frame we archive or stream is prefixed with an
//! 8-byte PPI header and zero or more TLV fields carrying radio metadata.
//! All integers are little-endian on the wire regardless of host order.

use enum_dispatch::enum_dispatch;
use thiserror::Error;

/// DLT for PPI-encapsulated captures.
pub const DLT_PPI: u32 = 192;
/// DLT of the wrapped payload.
pub const DLT_IEEE802_11: u32 = 105;

pub const PPI_FIELD_11COMMON: u16 = 2;
pub const PPI_FIELD_11NMAC: u16 = 3;
pub const PPI_FIELD_11NMACPHY: u16 = 4;
pub const PPI_FIELD_GPS: u16 = 30002;

pub const PPI_GPS_MAGIC: u8 = 0xCF;

pub const PPI_GPS_FLAG_LON: u32 = 2;
pub const PPI_GPS_FLAG_LAT: u32 = 4;
pub const PPI_GPS_FLAG_ALT: u32 = 8;
pub const PPI_GPS_FLAG_APPID: u32 = 1 << 29;

pub const PPI_80211_FLAG_FCS: u16 = 1;
pub const PPI_80211_FLAG_INVALFCS: u16 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PpiError {
    #[error("truncated ppi record: {0} bytes")]
    Truncated(usize),
    #[error("unsupported ppi version {0}")]
    BadVersion(u8),
    #[error("ppi field {field_type} length {length} overruns header region")]
    FieldOverrun { field_type: u16, length: u16 },
}

/// Common behavior of every PPI TLV body.
#[enum_dispatch]
pub trait PpiFieldData {
    fn field_type(&self) -> u16;
    fn data_len(&self) -> usize;
    fn write_data(&self, out: &mut Vec<u8>);
}

/// 802.11-Common radio header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ppi80211Common {
    pub tsf_timer: u64,
    pub flags: u16,
    /// Data rate in 500 kbps units.
    pub rate: u16,
    pub freq_mhz: u16,
    pub chan_flags: u16,
    pub fhss_hopset: u8,
    pub fhss_pattern: u8,
    pub signal_dbm: i8,
    pub noise_dbm: i8,
}

impl PpiFieldData for Ppi80211Common {
    fn field_type(&self) -> u16 {
        PPI_FIELD_11COMMON
    }

    fn data_len(&self) -> usize {
        20
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tsf_timer.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.rate.to_le_bytes());
        out.extend_from_slice(&self.freq_mhz.to_le_bytes());
        out.extend_from_slice(&self.chan_flags.to_le_bytes());
        out.push(self.fhss_hopset);
        out.push(self.fhss_pattern);
        out.push(self.signal_dbm as u8);
        out.push(self.noise_dbm as u8);
    }
}

impl Ppi80211Common {
    fn read(data: &[u8]) -> Result<Self, PpiError> {
        if data.len() < 20 {
            return Err(PpiError::Truncated(data.len()));
        }

        Ok(Self {
            tsf_timer: u64::from_le_bytes(data[0..8].try_into().expect("len checked")),
            flags: u16::from_le_bytes([data[8], data[9]]),
            rate: u16::from_le_bytes([data[10], data[11]]),
            freq_mhz: u16::from_le_bytes([data[12], data[13]]),
            chan_flags: u16::from_le_bytes([data[14], data[15]]),
            fhss_hopset: data[16],
            fhss_pattern: data[17],
            signal_dbm: data[18] as i8,
            noise_dbm: data[19] as i8,
        })
    }
}

/// GPS TLV with a fields-present bitmask. Latitude and longitude use the
/// fixed 3.7 encoding (value + 180, scaled 1e7); altitude uses fixed 6.4
/// (value + 180000, scaled 1e4).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PpiGps {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub appid: bool,
}

pub fn fixed3_7_encode(v: f64) -> u32 {
    ((v + 180.0) * 10_000_000.0).round() as u32
}

pub fn fixed3_7_decode(raw: u32) -> f64 {
    raw as f64 / 10_000_000.0 - 180.0
}

pub fn fixed6_4_encode(v: f64) -> u32 {
    ((v + 180_000.0) * 10_000.0).round() as u32
}

pub fn fixed6_4_decode(raw: u32) -> f64 {
    raw as f64 / 10_000.0 - 180_000.0
}

impl PpiGps {
    fn fields_present(&self) -> u32 {
        let mut p = 0;
        if self.lon.is_some() {
            p |= PPI_GPS_FLAG_LON;
        }
        if self.lat.is_some() {
            p |= PPI_GPS_FLAG_LAT;
        }
        if self.alt.is_some() {
            p |= PPI_GPS_FLAG_ALT;
        }
        if self.appid {
            p |= PPI_GPS_FLAG_APPID;
        }
        p
    }

    fn read(data: &[u8]) -> Result<Self, PpiError> {
        if data.len() < 8 {
            return Err(PpiError::Truncated(data.len()));
        }

        let present = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let mut pos = 8;
        let mut gps = PpiGps::default();

        let mut take_u32 = |pos: &mut usize| -> Result<u32, PpiError> {
            if *pos + 4 > data.len() {
                return Err(PpiError::Truncated(data.len()));
            }
            let v = u32::from_le_bytes(
                data[*pos..*pos + 4].try_into().expect("len checked"),
            );
            *pos += 4;
            Ok(v)
        };

        // Field data follows bitmask order, low bits first.
        if present & PPI_GPS_FLAG_LON != 0 {
            gps.lon = Some(fixed3_7_decode(take_u32(&mut pos)?));
        }
        if present & PPI_GPS_FLAG_LAT != 0 {
            gps.lat = Some(fixed3_7_decode(take_u32(&mut pos)?));
        }
        if present & PPI_GPS_FLAG_ALT != 0 {
            gps.alt = Some(fixed6_4_decode(take_u32(&mut pos)?));
        }
        if present & PPI_GPS_FLAG_APPID != 0 {
            let _ = take_u32(&mut pos)?;
            gps.appid = true;
        }

        Ok(gps)
    }
}

impl PpiFieldData for PpiGps {
    fn field_type(&self) -> u16 {
        PPI_FIELD_GPS
    }

    fn data_len(&self) -> usize {
        let mut n = 8;
        if self.lon.is_some() {
            n += 4;
        }
        if self.lat.is_some() {
            n += 4;
        }
        if self.alt.is_some() {
            n += 4;
        }
        if self.appid {
            n += 4;
        }
        n
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        out.push(2); // gps header version
        out.push(PPI_GPS_MAGIC);
        out.extend_from_slice(&(self.data_len() as u16).to_le_bytes());
        out.extend_from_slice(&self.fields_present().to_le_bytes());

        if let Some(lon) = self.lon {
            out.extend_from_slice(&fixed3_7_encode(lon).to_le_bytes());
        }
        if let Some(lat) = self.lat {
            out.extend_from_slice(&fixed3_7_encode(lat).to_le_bytes());
        }
        if let Some(alt) = self.alt {
            out.extend_from_slice(&fixed6_4_encode(alt).to_le_bytes());
        }
        if self.appid {
            out.extend_from_slice(b"KIS\0");
        }
    }
}

/// 11n MAC extension TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ppi11nMac {
    pub flags: u32,
    pub a_mpdu_id: u32,
    pub num_delimiters: u8,
}

impl PpiFieldData for Ppi11nMac {
    fn field_type(&self) -> u16 {
        PPI_FIELD_11NMAC
    }

    fn data_len(&self) -> usize {
        12
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.a_mpdu_id.to_le_bytes());
        out.push(self.num_delimiters);
        out.extend_from_slice(&[0u8; 3]);
    }
}

impl Ppi11nMac {
    fn read(data: &[u8]) -> Result<Self, PpiError> {
        if data.len() < 12 {
            return Err(PpiError::Truncated(data.len()));
        }
        Ok(Self {
            flags: u32::from_le_bytes(data[0..4].try_into().expect("len checked")),
            a_mpdu_id: u32::from_le_bytes(data[4..8].try_into().expect("len checked")),
            num_delimiters: data[8],
        })
    }
}

/// 11n MAC+PHY extension TLV; antenna arrays are fixed four-element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ppi11nMacPhy {
    pub flags: u32,
    pub a_mpdu_id: u32,
    pub num_delimiters: u8,
    pub mcs: u8,
    pub num_streams: u8,
    pub combined_rssi: u8,
    pub ant_ctl_rssi: [u8; 4],
    pub ant_ext_rssi: [u8; 4],
    pub extension_freq_mhz: u16,
    pub extension_flags: u16,
    pub ant_signal_dbm: [i8; 4],
    pub ant_noise_dbm: [i8; 4],
    pub evm: [u32; 4],
}

impl PpiFieldData for Ppi11nMacPhy {
    fn field_type(&self) -> u16 {
        PPI_FIELD_11NMACPHY
    }

    fn data_len(&self) -> usize {
        48
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.a_mpdu_id.to_le_bytes());
        out.push(self.num_delimiters);
        out.push(self.mcs);
        out.push(self.num_streams);
        out.push(self.combined_rssi);
        out.extend_from_slice(&self.ant_ctl_rssi);
        out.extend_from_slice(&self.ant_ext_rssi);
        out.extend_from_slice(&self.extension_freq_mhz.to_le_bytes());
        out.extend_from_slice(&self.extension_flags.to_le_bytes());
        for v in self.ant_signal_dbm {
            out.push(v as u8);
        }
        for v in self.ant_noise_dbm {
            out.push(v as u8);
        }
        for v in self.evm {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

impl Ppi11nMacPhy {
    fn read(data: &[u8]) -> Result<Self, PpiError> {
        if data.len() < 48 {
            return Err(PpiError::Truncated(data.len()));
        }

        let mut v = Self {
            flags: u32::from_le_bytes(data[0..4].try_into().expect("len checked")),
            a_mpdu_id: u32::from_le_bytes(data[4..8].try_into().expect("len checked")),
            num_delimiters: data[8],
            mcs: data[9],
            num_streams: data[10],
            combined_rssi: data[11],
            extension_freq_mhz: u16::from_le_bytes([data[20], data[21]]),
            extension_flags: u16::from_le_bytes([data[22], data[23]]),
            ..Default::default()
        };

        v.ant_ctl_rssi.copy_from_slice(&data[12..16]);
        v.ant_ext_rssi.copy_from_slice(&data[16..20]);
        for i in 0..4 {
            v.ant_signal_dbm[i] = data[24 + i] as i8;
            v.ant_noise_dbm[i] = data[28 + i] as i8;
        }
        for i in 0..4 {
            v.evm[i] = u32::from_le_bytes(
                data[32 + i * 4..36 + i * 4].try_into().expect("len checked"),
            );
        }

        Ok(v)
    }
}

/// Closed set of TLV bodies carried by a PPI header.
#[enum_dispatch(PpiFieldData)]
#[derive(Debug, Clone, PartialEq)]
pub enum PpiField {
    Common(Ppi80211Common),
    Gps(PpiGps),
    NMac(Ppi11nMac),
    NMacPhy(Ppi11nMacPhy),
}

/// A decoded PPI record: header fields plus the wrapped payload offset.
#[derive(Debug, Clone, PartialEq)]
pub struct PpiPacket {
    pub dlt: u32,
    pub fields: Vec<PpiField>,
    pub payload: Vec<u8>,
}

/// Encodes a PPI header + fields + payload into one wire record.
pub fn encode_ppi(dlt: u32, fields: &[PpiField], payload: &[u8]) -> Vec<u8> {
    let fields_len: usize =
        fields.iter().map(|f| 4 + f.data_len()).sum::<usize>();
    let header_len = 8 + fields_len;

    let mut out = Vec::with_capacity(header_len + payload.len());
    out.push(0); // version
    out.push(0); // flags
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(&dlt.to_le_bytes());

    for f in fields {
        out.extend_from_slice(&f.field_type().to_le_bytes());
        out.extend_from_slice(&(f.data_len() as u16).to_le_bytes());
        f.write_data(&mut out);
    }

    out.extend_from_slice(payload);
    out
}

/// Decodes one PPI record. Unknown field types are skipped; the payload is
/// everything past the declared header length.
pub fn decode_ppi(raw: &[u8]) -> Result<PpiPacket, PpiError> {
    if raw.len() < 8 {
        return Err(PpiError::Truncated(raw.len()));
    }

    if raw[0] != 0 {
        return Err(PpiError::BadVersion(raw[0]));
    }

    let header_len = u16::from_le_bytes([raw[2], raw[3]]) as usize;
    let dlt = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);

    if header_len < 8 || header_len > raw.len() {
        return Err(PpiError::Truncated(raw.len()));
    }

    let mut fields = Vec::new();
    let mut pos = 8;

    while pos + 4 <= header_len {
        let ftype = u16::from_le_bytes([raw[pos], raw[pos + 1]]);
        let flen = u16::from_le_bytes([raw[pos + 2], raw[pos + 3]]);
        pos += 4;

        if pos + flen as usize > header_len {
            return Err(PpiError::FieldOverrun { field_type: ftype, length: flen });
        }

        let body = &raw[pos..pos + flen as usize];
        pos += flen as usize;

        match ftype {
            PPI_FIELD_11COMMON => fields.push(Ppi80211Common::read(body)?.into()),
            PPI_FIELD_GPS => fields.push(PpiGps::read(body)?.into()),
            PPI_FIELD_11NMAC => fields.push(Ppi11nMac::read(body)?.into()),
            PPI_FIELD_11NMACPHY => fields.push(Ppi11nMacPhy::read(body)?.into()),
            _ => {},
        }
    }

    Ok(PpiPacket { dlt, fields, payload: raw[header_len..].to_vec() })
}
