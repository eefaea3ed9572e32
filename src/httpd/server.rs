// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! HTTP server assembly: state from config, router construction, serving.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, bail};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    alerts::{AlertFields, AlertTracker},
    cfg::config::ConfigFile,
    devices::tracker::DeviceTracker,
    httpd::{
        HttpState,
        auth::{AdminLogin, AuthStore},
        registry::RouteRegistry,
        routes,
    },
    logs::LogTracker,
    models::elements::FieldRegistry,
    packet::{chain::PacketChain, components::names, frame::ComponentId},
    stream::StreamTracker,
    utils::now_unix,
};

/// External collaborators wired into the HTTP layer.
pub struct HttpCollaborators {
    pub registry: Arc<FieldRegistry>,
    pub devices: Arc<DeviceTracker>,
    pub alerts: Arc<AlertTracker>,
    pub logs: Arc<LogTracker>,
    pub streams: Arc<StreamTracker>,
    pub chain: Arc<PacketChain>,
    pub queue_drops: Arc<std::sync::atomic::AtomicU64>,
}

fn home_path(config: &ConfigFile, template: &str) -> PathBuf {
    PathBuf::from(config.process_log_template(template, "", "", 0))
}

/// Resolves the admin login from global config, falling back to the user
/// httpd config file. A half-configured global login is a startup error.
fn resolve_admin(config: &ConfigFile) -> Result<AdminLogin> {
    let user_config_path = home_path(config, "%h/.kismet/kismet_httpd.conf");

    let global_user = config.fetch_opt("httpd_username");
    let global_pass = config.fetch_opt("httpd_password");

    if global_user.is_some() || global_pass.is_some() {
        let (Some(username), Some(password)) = (global_user, global_pass) else {
            bail!(
                "found a partial httpd_username/httpd_password pair in the \
                 global configuration; both are required"
            );
        };

        info!(
            "administrator login configured in global config; it cannot be \
             changed via the API"
        );

        return Ok(AdminLogin {
            username,
            password,
            from_global_config: true,
            user_config_path,
        });
    }

    let user_config = ConfigFile::new();
    let mut username = String::new();
    let mut password = String::new();

    if user_config_path.exists() {
        if let Err(e) = user_config.parse_config(&user_config_path) {
            warn!(error = %e, "could not parse user httpd config");
        } else {
            username = user_config.fetch_opt_dfl("httpd_username", "");
            password = user_config.fetch_opt_dfl("httpd_password", "");

            if username.is_empty() != password.is_empty() {
                warn!("user httpd config has only one of username/password");
                username.clear();
                password.clear();
            }
        }
    }

    if password.is_empty() {
        info!(
            "no administrator login configured; set one via the \
             /session/set_password API before using authenticated features"
        );
    }

    Ok(AdminLogin {
        username,
        password,
        from_global_config: false,
        user_config_path,
    })
}

/// Builds the shared HTTP state from config and collaborators.
pub fn build_state(
    config: Arc<ConfigFile>,
    collab: HttpCollaborators,
) -> Result<Arc<HttpState>> {
    let admin = resolve_admin(&config)?;

    let session_db = home_path(
        &config,
        &config.fetch_opt_dfl("httpd_session_db", "%h/.kismet/session.db"),
    );

    let jwt_key = config.fetch_opt_dfl("httpd_jwt_key", "");
    let jwt_issuer = config.fetch_opt_dfl("httpd_jwt_issuer", "kismet");

    let auth = Arc::new(AuthStore::new(session_db, &jwt_key, &jwt_issuer)?);

    let comp_l1: ComponentId = collab.chain.register_packet_component(names::L1_RADIO);
    let comp_gps: ComponentId = collab.chain.register_packet_component(names::GPS_FIX);
    let comp_dot11: ComponentId =
        collab.chain.register_packet_component(names::DOT11_INFO);

    let alert_fields = AlertFields::register(&collab.registry);

    Ok(Arc::new(HttpState {
        config: Arc::clone(&config),
        registry: collab.registry,
        auth,
        admin: Mutex::new(admin),
        devices: collab.devices,
        alerts: collab.alerts,
        alert_fields,
        logs: collab.logs,
        streams: collab.streams,
        chain: collab.chain,
        comp_l1,
        comp_gps,
        comp_dot11,
        phy_id: crate::phy80211::phy_id(),
        allow_auth_view: config.fetch_opt_bool("httpd_allow_auth_view", false),
        allow_auth_creation: config.fetch_opt_bool("httpd_allow_auth_creation", true),
        start_time: now_unix(),
        queue_drops: collab.queue_drops,
    }))
}

/// Builds the router: core routes, static serving, CORS, prefix handling.
pub fn build_router(state: Arc<HttpState>) -> Router {
    let config = Arc::clone(&state.config);
    let mut registry = RouteRegistry::new(state);

    routes::register_all(&mut registry);

    let static_dir = config.fetch_opt_dfl("httpd_home", "");
    if static_dir.is_empty() {
        info!(
            "no httpd_home configured, disabling static file serving; REST \
             endpoints remain available"
        );
    } else {
        info!(dir = %static_dir, "serving static file content");
        registry.register_static_dir("/", &static_dir);
    }

    registry.build(
        config.fetch_opt_bool("httpd_allow_cors", false),
        &config.fetch_opt_dfl("httpd_allowed_origin", ""),
        &config.fetch_opt_dfl("httpd_uri_prefix", ""),
        &config.fetch_opt_dfl("httpd_redirect_unknown", ""),
    )
}

/// Binds and serves until the cancellation token fires. An unbindable
/// address is a fatal startup error surfaced to the caller.
pub async fn serve(
    router: Router,
    bind_address: &str,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = format!("{bind_address}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind http server to {addr}"))?;

    info!(addr = %addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("http server failed")
}
