// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod auth;
pub mod registry;
pub mod routes;
pub mod server;

use std::sync::{
    Arc, Mutex,
    atomic::AtomicU64,
};

use crate::{
    alerts::{AlertFields, AlertTracker},
    cfg::config::ConfigFile,
    devices::tracker::DeviceTracker,
    httpd::auth::{AdminLogin, AuthStore},
    logs::LogTracker,
    models::elements::FieldRegistry,
    packet::{chain::PacketChain, frame::ComponentId},
    stream::StreamTracker,
};

/// Everything the HTTP layer needs, threaded through axum state.
pub struct HttpState {
    pub config: Arc<ConfigFile>,
    pub registry: Arc<FieldRegistry>,
    pub auth: Arc<AuthStore>,
    pub admin: Mutex<AdminLogin>,
    pub devices: Arc<DeviceTracker>,
    pub alerts: Arc<AlertTracker>,
    pub alert_fields: AlertFields,
    pub logs: Arc<LogTracker>,
    pub streams: Arc<StreamTracker>,
    pub chain: Arc<PacketChain>,

    pub comp_l1: ComponentId,
    pub comp_gps: ComponentId,
    pub comp_dot11: ComponentId,

    pub phy_id: u32,

    /// Expose opaque tokens in the apikey list endpoint.
    pub allow_auth_view: bool,
    /// Allow API-driven key creation/revocation.
    pub allow_auth_creation: bool,

    pub start_time: u64,
    /// Frames dropped by the capture queue, surfaced in /system/status.
    pub queue_drops: Arc<AtomicU64>,
}
