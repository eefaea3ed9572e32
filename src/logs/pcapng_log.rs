// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The pcap-NG file log driver.
//!
//! A singleton sink at the LOGGING stage; frames are PPI-wrapped (802.11)
//! or written under their native DLT, multiplexed per capture source into
//! one pcap-NG section.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use tracing::warn;
use uuid::Uuid;

use crate::{
    logs::{Logfile, LogfileBuilder},
    models::{
        pcapng::PcapngEncoder,
        ppi::{
            DLT_IEEE802_11, DLT_PPI, Ppi80211Common, PpiField, PpiGps, encode_ppi,
        },
    },
    packet::{
        chain::{ChainHandler, ChainPos, HandlerId, PacketChain},
        components::{GpsFix, L1Radio},
        frame::{ComponentId, Frame},
    },
};

/// Builds one PPI-wrapped record for a frame, pulling radio and GPS
/// annotations into the TLV headers. Shared with the live HTTP streamer.
pub fn ppi_wrap(frame: &Frame, comp_l1: ComponentId, comp_gps: ComponentId) -> Vec<u8> {
    let mut fields = Vec::new();

    if let Some(l1) = frame.get::<L1Radio>(comp_l1) {
        fields.push(PpiField::Common(Ppi80211Common {
            tsf_timer: l1.tsf_timer,
            flags: 0,
            rate: l1.datarate_500kbps,
            freq_mhz: l1.freq_mhz,
            chan_flags: 0,
            fhss_hopset: 0,
            fhss_pattern: 0,
            signal_dbm: l1.signal_dbm,
            noise_dbm: l1.noise_dbm,
        }));
    }

    if let Some(gps) = frame.get::<GpsFix>(comp_gps)
        && gps.fix >= 2
    {
        fields.push(PpiField::Gps(PpiGps {
            lat: Some(gps.lat),
            lon: Some(gps.lon),
            alt: (gps.fix >= 3).then_some(gps.alt),
            appid: true,
        }));
    }

    encode_ppi(DLT_IEEE802_11, &fields, &frame.data)
}

struct PcapngSink {
    uuid: Uuid,
    path: PathBuf,
    open: AtomicBool,
    writer: Mutex<Option<BufWriter<File>>>,
    encoder: Mutex<PcapngEncoder>,
    bytes: AtomicU64,
    packets: AtomicU64,
    drop_duplicates: bool,
    comp_l1: ComponentId,
    comp_gps: ComponentId,
}

impl PcapngSink {
    fn write_frame(&self, frame: &Frame) {
        if !self.open.load(Ordering::SeqCst) {
            return;
        }

        if self.drop_duplicates && frame.duplicate {
            return;
        }

        // 802.11 frames get PPI framing; PPI captures pass through; other
        // link types are written raw under their own DLT.
        let (dlt, record) = match frame.dlt {
            DLT_IEEE802_11 => {
                (DLT_PPI, ppi_wrap(frame, self.comp_l1, self.comp_gps))
            },
            other => (other, frame.data.to_vec()),
        };

        let blocks = {
            let mut encoder = self.encoder.lock().unwrap_or_else(|e| e.into_inner());
            encoder.encode_packet(&frame.source, dlt, frame.ts_us, &record)
        };

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(w) = writer.as_mut() {
            if let Err(e) = w.write_all(&blocks) {
                warn!(path = ?self.path, error = %e, "pcapng write failed, closing log");
                *writer = None;
                self.open.store(false, Ordering::SeqCst);
                return;
            }

            self.bytes.fetch_add(blocks.len() as u64, Ordering::Relaxed);
            self.packets.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Public logfile wrapper holding the chain registration.
pub struct PcapngLogfile {
    sink: Arc<PcapngSink>,
    chain: Arc<PacketChain>,
    handler_id: HandlerId,
}

struct SinkHandler(Arc<PcapngSink>);

impl ChainHandler for SinkHandler {
    fn name(&self) -> &'static str {
        "pcapng_log"
    }

    fn handle(&self, frame: &mut Frame) -> i32 {
        self.0.write_frame(frame);
        0
    }
}

impl Logfile for PcapngLogfile {
    fn uuid(&self) -> Uuid {
        self.sink.uuid
    }

    fn path(&self) -> PathBuf {
        self.sink.path.clone()
    }

    fn log_class(&self) -> &'static str {
        "pcapng"
    }

    fn is_open(&self) -> bool {
        self.sink.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if !self.sink.open.swap(false, Ordering::SeqCst) {
            return;
        }

        self.chain.remove_handler(ChainPos::Logging, self.handler_id);

        let mut writer = self.sink.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut w) = writer.take()
            && let Err(e) = w.flush()
        {
            warn!(path = ?self.sink.path, error = %e, "pcapng flush on close failed");
        }
    }

    fn flush(&self) {
        let mut writer = self.sink.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(w) = writer.as_mut()
            && let Err(e) = w.flush()
        {
            warn!(path = ?self.sink.path, error = %e, "pcapng flush failed");
        }
    }

    fn bytes_written(&self) -> u64 {
        self.sink.bytes.load(Ordering::Relaxed)
    }

    fn packets_written(&self) -> u64 {
        self.sink.packets.load(Ordering::Relaxed)
    }
}

/// Driver registered with the log tracker.
pub struct PcapngLogBuilder {
    chain: Arc<PacketChain>,
    comp_l1: ComponentId,
    comp_gps: ComponentId,
    drop_duplicates: bool,
}

impl PcapngLogBuilder {
    pub fn new(
        chain: Arc<PacketChain>,
        comp_l1: ComponentId,
        comp_gps: ComponentId,
        drop_duplicates: bool,
    ) -> Self {
        Self { chain, comp_l1, comp_gps, drop_duplicates }
    }
}

impl LogfileBuilder for PcapngLogBuilder {
    fn log_class(&self) -> &'static str {
        "pcapng"
    }

    fn description(&self) -> &'static str {
        "pcap-NG multi-interface packet capture"
    }

    fn singleton(&self) -> bool {
        true
    }

    fn build(&self, path: PathBuf) -> Result<Arc<dyn Logfile>> {
        let file = File::create(&path)
            .with_context(|| format!("creating pcapng log {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let mut encoder = PcapngEncoder::new();
        let shb = encoder.start();
        writer
            .write_all(&shb)
            .with_context(|| format!("writing pcapng header {}", path.display()))?;

        let sink = Arc::new(PcapngSink {
            uuid: Uuid::new_v4(),
            path,
            open: AtomicBool::new(true),
            writer: Mutex::new(Some(writer)),
            encoder: Mutex::new(encoder),
            bytes: AtomicU64::new(0),
            packets: AtomicU64::new(0),
            drop_duplicates: self.drop_duplicates,
            comp_l1: self.comp_l1,
            comp_gps: self.comp_gps,
        });

        let handler_id = self.chain.register_handler(
            ChainPos::Logging,
            100,
            Box::new(SinkHandler(Arc::clone(&sink))),
        );

        Ok(Arc::new(PcapngLogfile {
            sink,
            chain: Arc::clone(&self.chain),
            handler_id,
        }))
    }
}
