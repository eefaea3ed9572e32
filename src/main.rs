// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, atomic::AtomicU64};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wlan_sentry_rs::{
    alerts::AlertTracker,
    capture::{DEFAULT_QUEUE_DEPTH, FrameQueue, spawn_processing_thread},
    cfg::{
        cli::{LogOverrides, resolve_config_path},
        config::{ConfigFile, ConfigPaths},
        logger::init_logger,
    },
    devices::tracker::DeviceTracker,
    httpd::server::{HttpCollaborators, build_router, build_state, serve},
    logs::{LogTracker, pcapng_log::PcapngLogBuilder},
    lookups::oui::OuiTracker,
    models::elements::FieldRegistry,
    packet::{
        chain::{ChainPos, PacketChain},
        components::names,
    },
    phy80211::{
        self,
        classifier::{Dot11Classifier, Dot11Dissector},
        tracker_stage::{Dot11TrackerOptions, Dot11TrackerStage},
    },
    stream::StreamTracker,
    utils::now_unix,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let overrides = LogOverrides::from_args(args.iter().cloned());

    // Config file: first non-flag argument, or the default name.
    let config_path = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with('-'))
        .cloned()
        .unwrap_or_else(|| "wlan_sentry.conf".to_string());

    let config = Arc::new(ConfigFile::new());
    match resolve_config_path(&config_path) {
        Ok(path) => config
            .parse_config(&path)
            .with_context(|| format!("parsing config {path:?}"))?,
        Err(_) => {
            eprintln!("no config file at {config_path}, using built-in defaults");
        },
    }

    let mut paths = ConfigPaths {
        home_dir: std::env::var("HOME").unwrap_or_else(|_| ".".into()),
        log_prefix: config.fetch_opt_dfl("log_prefix", "./"),
        data_dir: config.fetch_opt_dfl("data_dir", ""),
        etc_dir: config.fetch_opt_dfl("etc_dir", ""),
        bin_dir: std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.display().to_string()))
            .unwrap_or_default(),
    };
    if let Some(prefix) = &overrides.log_prefix {
        paths.log_prefix = prefix.clone();
    }
    config.set_paths(paths);

    let _log_guard = init_logger(&config)?;
    info!("wlan-sentry starting");

    let cancel = CancellationToken::new();

    // ── shared context ──────────────────────────────────────────────────

    let registry = Arc::new(FieldRegistry::new());
    let alerts = Arc::new(AlertTracker::new());
    phy80211::register_alerts(&alerts);

    let oui = Arc::new(OuiTracker::from_config(&config));

    let devices = Arc::new(DeviceTracker::new(
        &registry,
        config.fetch_opt_as("tracker_device_timeout", 0u64),
        config.fetch_opt_as("tracker_device_packets", 10u64),
    ));

    let chain = Arc::new(PacketChain::new());
    let streams = Arc::new(StreamTracker::new(&registry));

    let comp_l1 = chain.register_packet_component(names::L1_RADIO);
    let comp_gps = chain.register_packet_component(names::GPS_FIX);
    let comp_dot11 = chain.register_packet_component(names::DOT11_INFO);
    let comp_decap = chain.register_packet_component(names::DECAP_CHUNK);
    let comp_data = chain.register_packet_component(names::DATA_PAYLOAD);
    let comp_common = chain.register_packet_component(names::COMMON_INFO);
    let comp_checksum = chain.register_packet_component(names::CHECKSUM);

    // ── 802.11 pipeline stages ──────────────────────────────────────────

    chain.register_handler(
        ChainPos::LlcDissect,
        0,
        Box::new(Dot11Dissector::new(comp_dot11, comp_decap, comp_data, comp_l1)),
    );

    chain.register_handler(
        ChainPos::Classifier,
        0,
        Box::new(Dot11Classifier::new(
            comp_dot11,
            comp_common,
            comp_l1,
            comp_checksum,
            phy80211::phy_id(),
            Arc::clone(&alerts),
        )),
    );

    chain.register_handler(
        ChainPos::Tracker,
        0,
        Box::new(Dot11TrackerStage::new(
            comp_dot11,
            comp_l1,
            comp_gps,
            phy80211::phy_id(),
            Arc::from(phy80211::PHY_NAME),
            Arc::clone(&devices),
            Arc::clone(&oui),
            Arc::clone(&alerts),
            Dot11TrackerOptions {
                bssts_threshold: config
                    .fetch_opt_as("dot11_bssts_threshold", 15u32),
                wps_m3_threshold: config
                    .fetch_opt_as("dot11_wps_m3_threshold", 5u32),
            },
        )),
    );

    // ── logging ─────────────────────────────────────────────────────────

    let logging_enabled = !overrides.no_logging
        && config.fetch_opt_bool("enable_logging", true);
    let log_title = overrides
        .log_title
        .unwrap_or_else(|| config.fetch_opt_dfl("log_title", "Kismet"));

    let logs = Arc::new(LogTracker::new(
        Arc::clone(&config),
        &registry,
        log_title,
        logging_enabled,
    ));

    logs.register_log(Arc::new(PcapngLogBuilder::new(
        Arc::clone(&chain),
        comp_l1,
        comp_gps,
        !config.fetch_opt_bool("pcapng_log_duplicate_packets", true),
    )))
    .context("registering pcapng log driver")?;

    let log_types: Vec<String> = overrides
        .log_types
        .unwrap_or_else(|| config.fetch_opt_dfl("log_types", ""))
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    logs.open_configured(&log_types);

    // ── capture → processing pipeline ───────────────────────────────────

    let queue_drops = Arc::new(AtomicU64::new(0));
    let frame_queue = Arc::new(FrameQueue::new(
        config.fetch_opt_as("packet_queue_depth", DEFAULT_QUEUE_DEPTH),
        Arc::clone(&queue_drops),
    ));
    let processing = spawn_processing_thread(
        Arc::clone(&frame_queue),
        Arc::clone(&chain),
    )
    .context("spawning processing thread")?;

    // Capture sources register themselves against the frame queue; the
    // core runs headless without any, serving the API and logs.
    info!("no capture sources configured; running with API only");

    // ── timer sweeps ────────────────────────────────────────────────────

    let http_state = build_state(
        Arc::clone(&config),
        HttpCollaborators {
            registry: Arc::clone(&registry),
            devices: Arc::clone(&devices),
            alerts: Arc::clone(&alerts),
            logs: Arc::clone(&logs),
            streams: Arc::clone(&streams),
            chain: Arc::clone(&chain),
            queue_drops: Arc::clone(&queue_drops),
        },
    )?;

    {
        let devices = Arc::clone(&devices);
        let logs = Arc::clone(&logs);
        let auth = Arc::clone(&http_state.auth);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            let mut seconds = 0u64;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {},
                }

                seconds += 1;
                devices.rotate_second();

                if seconds % 30 == 0 {
                    devices.expire_idle(now_unix());
                    logs.flush_all();
                }

                if seconds % 300 == 0 {
                    auth.gc_expired();
                    auth.store();
                }
            }
        });
    }

    // ── http ────────────────────────────────────────────────────────────

    let router = build_router(Arc::clone(&http_state));
    let bind_address = config.fetch_opt_dfl("httpd_bind_address", "0.0.0.0");
    let port = config.fetch_opt_as("httpd_port", 2501u16);

    let server = {
        let cancel = cancel.clone();
        tokio::spawn(async move { serve(router, &bind_address, port, cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    cancel.cancel();
    frame_queue.close();

    if let Err(e) = server.await.context("joining http server")? {
        warn!(error = %e, "http server exited with error");
    }

    if processing.join().is_err() {
        warn!("processing thread panicked during shutdown");
    }

    logs.shutdown();
    http_state.auth.store();

    info!("wlan-sentry stopped");
    Ok(())
}
