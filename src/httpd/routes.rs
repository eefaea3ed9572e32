// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Endpoint registrations for the core API surface.

use std::{future::Future, sync::Arc, sync::atomic::Ordering};

use anyhow::{Context, bail};
use axum::{
    body::Body,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    devices::key::DeviceKey,
    httpd::{
        HttpState,
        auth::{ANY_ROLE, LOGON_ROLE, RO_ROLE, WEB_LOGON_NAME},
        registry::{
            HandlerResult, RequestCtx, RouteHandler, RouteRegistry, WsEndpoint,
            text_response,
        },
    },
    logs::pcap_http::open_pcap_stream,
    models::{elements::Element, mac::MacAddr},
    phy80211::packinfo::Dot11PackInfo,
    utils::now_unix,
};

fn h<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(RequestCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

const GET: &[Method] = &[Method::GET];
const POST: &[Method] = &[Method::POST];
const GET_POST: &[Method] = &[Method::GET, Method::POST];

/// Registers the full core route table.
pub fn register_all(reg: &mut RouteRegistry) {
    register_session_routes(reg);
    register_auth_routes(reg);
    register_logging_routes(reg);
    register_device_routes(reg);
    register_system_routes(reg);
    register_alert_routes(reg);
    register_stream_routes(reg);
    register_pcap_routes(reg);
}

// ─────────────────────────────────────────────────────────────────────────────
// Session management

fn register_session_routes(reg: &mut RouteRegistry) {
    reg.register_unauth_route(
        "/session/check_setup_ok",
        GET,
        h(|ctx| async move {
            let admin = ctx.state.admin.lock().unwrap_or_else(|e| e.into_inner());

            Ok(if admin.from_global_config {
                text_response(
                    StatusCode::NOT_ACCEPTABLE,
                    "Login configured in global config\n",
                )
            } else if admin.is_configured() {
                text_response(StatusCode::OK, "Login configured in user config\n")
            } else {
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Login not configured\n",
                )
            })
        }),
    );

    reg.register_route(
        "/session/check_login",
        GET,
        &[LOGON_ROLE],
        h(|_ctx| async move { Ok(text_response(StatusCode::OK, "Login valid\n")) }),
    );

    reg.register_route(
        "/session/check_session",
        GET,
        &[ANY_ROLE],
        h(|_ctx| async move { Ok(text_response(StatusCode::OK, "Session valid\n")) }),
    );

    reg.register_unauth_route(
        "/session/set_password",
        POST,
        h(|ctx| async move {
            let mut admin =
                ctx.state.admin.lock().unwrap_or_else(|e| e.into_inner());

            if admin.from_global_config {
                return Ok(text_response(
                    StatusCode::FORBIDDEN,
                    "Login is configured in the global configuration and may \
                     not be configured via this API.\n",
                ));
            }

            if admin.is_configured() {
                let valid_admin = ctx
                    .auth
                    .as_ref()
                    .is_some_and(|a| a.role.eq_ignore_ascii_case(LOGON_ROLE));

                if !valid_admin {
                    return Ok(text_response(
                        StatusCode::FORBIDDEN,
                        "Login is already configured; the existing login is \
                         required before it can be changed via this API.\n",
                    ));
                }
            }

            let (Some(username), Some(password)) =
                (ctx.var("username"), ctx.var("password"))
            else {
                return Ok(text_response(
                    StatusCode::BAD_REQUEST,
                    "Missing username or password in request\n",
                ));
            };

            admin.set(username, password)?;
            tracing::info!("a new administrator login and password have been set");

            Ok(text_response(StatusCode::OK, "Login configured\n"))
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// API keys

fn register_auth_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/auth/apikey/generate",
        POST,
        &[LOGON_ROLE],
        h(|ctx| async move {
            if !ctx.state.allow_auth_creation {
                bail!("auth creation is disabled in the configuration");
            }

            let doc = ctx.json.as_ref().context("missing JSON body")?;
            let name = doc
                .get("name")
                .and_then(|v| v.as_str())
                .context("missing auth name")?;
            let role = doc
                .get("role")
                .and_then(|v| v.as_str())
                .context("missing auth role")?;
            let duration = doc
                .get("duration")
                .and_then(|v| v.as_u64())
                .context("missing auth duration")?;

            let expiration = if duration != 0 { now_unix() + duration } else { 0 };

            let token = ctx.state.auth.create_auth(name, role, expiration)?;

            Ok(text_response(StatusCode::OK, token))
        }),
    );

    reg.register_route(
        "/auth/apikey/revoke",
        POST,
        &[LOGON_ROLE],
        h(|ctx| async move {
            if !ctx.state.allow_auth_creation {
                bail!("auth creation/deletion is disabled in the configuration");
            }

            let doc = ctx.json.as_ref().context("missing JSON body")?;
            let name = doc
                .get("name")
                .and_then(|v| v.as_str())
                .context("missing auth name")?;

            if name == WEB_LOGON_NAME {
                bail!("cannot remove autoprovisioned web logon");
            }

            if !ctx.state.auth.remove_auth(name) {
                bail!("cannot delete unknown auth record");
            }

            Ok(text_response(StatusCode::OK, "revoked\n"))
        }),
    );

    reg.register_route(
        "/auth/apikey/list",
        GET,
        &[LOGON_ROLE],
        h(|ctx| async move {
            let records: Vec<serde_json::Value> = ctx
                .state
                .auth
                .records()
                .into_iter()
                .map(|r| {
                    let mut v = json!({
                        "name": r.name,
                        "role": r.role,
                        "expiration": r.expires,
                    });
                    if ctx.state.allow_auth_view {
                        v["token"] = json!(r.token);
                    }
                    v
                })
                .collect();

            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&records)?,
            )
                .into_response())
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging control

fn register_logging_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/logging/drivers",
        GET_POST,
        &[RO_ROLE, ANY_ROLE],
        h(|ctx| async move {
            let el = ctx.state.logs.drivers_element();
            Ok(ctx.element_response(&el, Default::default()))
        }),
    );

    reg.register_route(
        "/logging/active",
        GET_POST,
        &[RO_ROLE, ANY_ROLE],
        h(|ctx| async move {
            let el = ctx.state.logs.active_element();
            Ok(ctx.element_response(&el, Default::default()))
        }),
    );

    reg.register_route(
        "/logging/by-uuid/:uuid/stop",
        GET_POST,
        &[LOGON_ROLE],
        h(|ctx| async move {
            let uuid: Uuid = ctx
                .param("uuid")
                .context("missing uuid")?
                .parse()
                .context("invalid uuid")?;

            if !ctx.state.logs.close_log(uuid) {
                bail!("no such log");
            }

            Ok(text_response(StatusCode::OK, "OK\n"))
        }),
    );

    reg.register_route(
        "/logging/by-class/:class/start",
        GET_POST,
        &[LOGON_ROLE],
        h(|ctx| async move {
            let class = ctx.param("class").context("missing log class")?;

            let logfile = ctx
                .state
                .logs
                .open_log(class)
                .with_context(|| format!("unable to open log of class {class}"))?;

            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                json!({
                    "uuid": logfile.uuid().to_string(),
                    "class": logfile.log_class(),
                    "path": logfile.path().display().to_string(),
                })
                .to_string(),
            )
                .into_response())
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Device views

fn register_device_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/devices/by-key/:key/:target",
        GET_POST,
        &[ANY_ROLE],
        h(|ctx| async move {
            let key: DeviceKey = ctx
                .param("key")
                .context("missing device key")?
                .parse()
                .context("invalid device key")?;
            let format = ctx.format_of(ctx.param("target").unwrap_or_default());

            let el = ctx
                .state
                .devices
                .device_element(key)
                .context("no such device")?;

            Ok(ctx.element_response(&el, format))
        }),
    );

    reg.register_route(
        "/devices/all_devices/:target",
        GET_POST,
        &[ANY_ROLE],
        h(|ctx| async move {
            let format = ctx.format_of(ctx.param("target").unwrap_or_default());
            let el = ctx.state.devices.devices_element(None);
            Ok(ctx.element_response(&el, format))
        }),
    );

    reg.register_route(
        "/devices/by-phy/:phy/:target",
        GET_POST,
        &[ANY_ROLE],
        h(|ctx| async move {
            let phy = ctx.param("phy").context("missing phy")?;
            let format = ctx.format_of(ctx.param("target").unwrap_or_default());

            let phy_id = match phy {
                crate::phy80211::PHY_NAME | "phy80211" => ctx.state.phy_id,
                other => crate::devices::key::phy_hash(other),
            };

            let el = ctx.state.devices.devices_element(Some(phy_id));
            Ok(ctx.element_response(&el, format))
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// System status

fn register_system_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/system/status",
        GET,
        &[ANY_ROLE],
        h(|ctx| async move {
            let stats = &ctx.state.chain.stats;

            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                json!({
                    "kismet.system.timestamp.start_sec": ctx.state.start_time,
                    "kismet.system.uptime_sec":
                        now_unix().saturating_sub(ctx.state.start_time),
                    "kismet.system.devices.count": ctx.state.devices.len(),
                    "kismet.system.packets.processed":
                        stats.processed.load(Ordering::Relaxed),
                    "kismet.system.packets.duplicates":
                        stats.duplicates.load(Ordering::Relaxed),
                    "kismet.system.packets.handler_errors":
                        stats.handler_errors.load(Ordering::Relaxed),
                    "kismet.system.packets.queue_drops":
                        ctx.state.queue_drops.load(Ordering::Relaxed),
                })
                .to_string(),
            )
                .into_response())
        }),
    );

    reg.register_route(
        "/system/tracked_fields",
        GET,
        &[ANY_ROLE],
        h(|ctx| async move {
            let fields: Vec<serde_json::Value> = ctx
                .state
                .registry
                .all()
                .into_iter()
                .map(|(id, meta)| {
                    json!({
                        "id": id,
                        "name": meta.name,
                        "description": meta.description,
                    })
                })
                .collect();

            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&fields)?,
            )
                .into_response())
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts

fn register_alert_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/alerts/definitions",
        GET,
        &[ANY_ROLE],
        h(|ctx| async move {
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&ctx.state.alerts.definitions())?,
            )
                .into_response())
        }),
    );

    reg.register_route(
        "/alerts/all_alerts",
        GET_POST,
        &[ANY_ROLE],
        h(|ctx| async move {
            let items: Vec<Element> = ctx
                .state
                .alerts
                .recent()
                .iter()
                .map(|a| ctx.state.alert_fields.to_element(a))
                .collect();

            Ok(ctx.element_response(&Element::Vector(items), Default::default()))
        }),
    );

    let ws_state = Arc::clone(reg.state());
    reg.register_websocket_route(
        "/alerts/monitor.ws",
        &[ANY_ROLE],
        Arc::new(move |mut endpoint: WsEndpoint| {
            let state = Arc::clone(&ws_state);
            Box::pin(async move {
                let mut rx = state.alerts.subscribe();

                loop {
                    match rx.recv().await {
                        Ok(alert) => {
                            let Ok(text) = serde_json::to_string(&alert) else {
                                continue;
                            };
                            if !endpoint.write(text).await {
                                break;
                            }
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                            continue;
                        },
                        Err(_) => break,
                    }
                }
            })
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream control

fn register_stream_routes(reg: &mut RouteRegistry) {
    reg.register_route(
        "/streams/all_streams",
        GET_POST,
        &[ANY_ROLE],
        h(|ctx| async move {
            let el = ctx.state.streams.to_element();
            Ok(ctx.element_response(&el, Default::default()))
        }),
    );

    for (action, f) in [
        ("pause", (|s: &crate::stream::StreamTracker, id| s.pause(id))
            as fn(&crate::stream::StreamTracker, u64) -> bool),
        ("resume", |s, id| s.resume(id)),
        ("stop", |s, id| s.stop(id)),
    ] {
        reg.register_route(
            &format!("/streams/by-id/:id/{action}"),
            GET_POST,
            &[LOGON_ROLE],
            h(move |ctx| async move {
                let id: u64 = ctx
                    .param("id")
                    .context("missing stream id")?
                    .parse()
                    .context("invalid stream id")?;

                if !f(&ctx.state.streams, id) {
                    bail!("no such stream");
                }

                Ok(text_response(StatusCode::OK, "OK\n"))
            }),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live pcap-NG

fn register_pcap_routes(reg: &mut RouteRegistry) {
    // Live stream of frames involving one BSSID. Back-pressure is
    // drop-new: a subscriber that cannot keep up loses the newest frames;
    // the packet chain itself never blocks on this endpoint.
    reg.register_route(
        "/phy/phy80211/by-bssid/:mac/pcap/:target",
        GET,
        &[ANY_ROLE],
        h(|ctx| async move {
            let mac: MacAddr = ctx
                .param("mac")
                .context("missing bssid")?
                .parse()
                .context("invalid bssid")?;

            let target = ctx.param("target").unwrap_or_default();
            let expected = format!("{}.pcapng", ctx.param("mac").unwrap_or_default());
            if !target.eq_ignore_ascii_case(&expected) {
                return Ok(text_response(
                    StatusCode::NOT_FOUND,
                    "Unknown capture target\n",
                ));
            }

            let key = DeviceKey::new(ctx.state.phy_id, mac);
            if ctx.state.devices.fetch(key).is_none() {
                return Ok(text_response(StatusCode::NOT_FOUND, "No such device\n"));
            }

            let comp_dot11 = ctx.state.comp_dot11;
            let body = open_pcap_stream(
                Arc::clone(&ctx.state.chain),
                Arc::clone(&ctx.state.streams),
                ctx.state.comp_l1,
                ctx.state.comp_gps,
                &format!("phy80211-{mac}.pcapng"),
                &format!("pcapng of all packets on phy80211 BSSID {mac}"),
                Box::new(move |frame| {
                    frame
                        .get::<Dot11PackInfo>(comp_dot11)
                        .is_some_and(|info| info.bssid() == mac)
                }),
            );

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/vnd.tcpdump.pcapng")
                .body(Body::from_stream(body))?)
        }),
    );
}
