// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod classifier;
pub mod device;
pub mod packinfo;
pub mod tracker_stage;

use crate::{alerts::{AlertSeverity, AlertTracker}, devices::key::phy_hash};

/// Canonical phy name; its hash keys every 802.11 device.
pub const PHY_NAME: &str = "IEEE802.11";

pub fn phy_id() -> u32 {
    phy_hash(PHY_NAME)
}

/// Alert types raised by the 802.11 stages.
pub mod alert_names {
    pub const LONG_SSID: &str = "LONGSSID";
    pub const NULL_PROBE_RESP: &str = "NULLPROBERESP";
    pub const INVALID_DEAUTH_REASON: &str = "DEAUTHINVALID";
    pub const DOT11D_MISMATCH: &str = "DOT11DMISMATCH";
    pub const BSS_TIMESTAMP: &str = "BSSTS";
    pub const WPS_BRUTE: &str = "WPSBRUTE";
    pub const NONCE_DUPLICATE: &str = "NONCE_DUPLICATE";
    pub const NONCE_ZERO: &str = "NONCE_ZERO";
}

/// Registers the 802.11 alert definitions once at startup.
pub fn register_alerts(alerts: &AlertTracker) {
    alerts.register(
        alert_names::LONG_SSID,
        "SSID tag longer than the protocol maximum of 32 bytes",
        AlertSeverity::Medium,
    );
    alerts.register(
        alert_names::NULL_PROBE_RESP,
        "probe response with a zero-length SSID, historic driver DoS",
        AlertSeverity::Medium,
    );
    alerts.register(
        alert_names::INVALID_DEAUTH_REASON,
        "deauthentication or disassociation with an invalid reason code",
        AlertSeverity::Medium,
    );
    alerts.register(
        alert_names::DOT11D_MISMATCH,
        "advertised channel outside the 802.11d country channel ranges",
        AlertSeverity::Low,
    );
    alerts.register(
        alert_names::BSS_TIMESTAMP,
        "BSS timestamp regression suggesting AP spoofing",
        AlertSeverity::High,
    );
    alerts.register(
        alert_names::WPS_BRUTE,
        "excessive WPS M3 exchanges suggesting a PIN brute force",
        AlertSeverity::High,
    );
    alerts.register(
        alert_names::NONCE_DUPLICATE,
        "WPA handshake nonce reused across replay counters",
        AlertSeverity::High,
    );
    alerts.register(
        alert_names::NONCE_ZERO,
        "WPA handshake with an all-zero nonce",
        AlertSeverity::High,
    );
}
