// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod alerts;
pub mod capture;
pub mod cfg;
pub mod devices;
pub mod httpd;
pub mod logs;
pub mod lookups;
pub mod models;
pub mod packet;
pub mod phy80211;
pub mod stream;
pub mod utils;
