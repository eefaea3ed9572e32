// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bearer-token and JWT authentication store.
//!
//! Opaque tokens are 16 random bytes hex-encoded, persisted as a JSON array
//! and compared with a constant-time scan. JWTs are HS256-signed with a
//! process key; when the key is not configured it is generated at startup
//! and never persisted, so JWTs deliberately die across restarts while
//! opaque tokens survive.

use std::{
    fs,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result, bail};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::{constant_time_eq, now_unix};

/// Role granted to the configured administrator and to full API keys.
pub const LOGON_ROLE: &str = "admin";
/// Pseudo-role accepted from any authenticated session.
pub const ANY_ROLE: &str = "any";
/// Read-only role.
pub const RO_ROLE: &str = "readonly";

/// Name of the autoprovisioned web login record; cannot be revoked.
pub const WEB_LOGON_NAME: &str = "web logon";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    pub name: String,
    pub role: String,
    pub created: u64,
    pub accessed: u64,
    pub expires: u64,
}

impl AuthRecord {
    /// `expires == 0` never expires.
    pub fn is_valid(&self, now: u64) -> bool {
        self.expires == 0 || self.expires > now
    }
}

/// Resolved identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    iss: String,
    name: String,
    role: String,
    created: u64,
    expires: u64,
}

pub struct AuthStore {
    records: Mutex<Vec<AuthRecord>>,
    db_path: PathBuf,
    jwt_key: Vec<u8>,
    jwt_issuer: String,
}

impl AuthStore {
    /// `jwt_key` empty means generate a random startup-only key.
    pub fn new(db_path: PathBuf, jwt_key: &str, jwt_issuer: &str) -> Result<Self> {
        let key = if jwt_key.is_empty() {
            let mut k = [0u8; 16];
            rand::rng().fill(&mut k);
            k.to_vec()
        } else if jwt_key.len() < 8 {
            bail!("invalid httpd_jwt_key value, expected at least 8 characters");
        } else {
            jwt_key.as_bytes().to_vec()
        };

        let store = Self {
            records: Mutex::new(Vec::new()),
            db_path,
            jwt_key: key,
            jwt_issuer: jwt_issuer.to_string(),
        };

        store.load();
        Ok(store)
    }

    fn generate_token() -> String {
        let mut raw = [0u8; 16];
        rand::rng().fill(&mut raw);
        hex::encode(raw)
    }

    /// Creates a named opaque token; duplicate names are rejected.
    pub fn create_auth(&self, name: &str, role: &str, expires: u64) -> Result<String> {
        let token = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());

            if records.iter().any(|r| r.name == name) {
                bail!("cannot create duplicate auth");
            }

            let token = Self::generate_token();
            let now = now_unix();

            records.push(AuthRecord {
                token: token.clone(),
                name: name.to_string(),
                role: role.to_string(),
                created: now,
                accessed: now,
                expires,
            });

            token
        };

        self.store();
        Ok(token)
    }

    /// Returns the existing token for `name`, upgrading the stored role and
    /// extending expiry when the request asks for more; creates otherwise.
    pub fn create_or_find_auth(
        &self,
        name: &str,
        role: &str,
        expires: u64,
    ) -> Result<String> {
        let (found, dirty) = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            let mut dirty = false;

            let found = records.iter_mut().find(|r| r.name == name).map(|r| {
                if r.role != role {
                    r.role = role.to_string();
                    dirty = true;
                }
                // expires == 0 never expires; a permanent record is never
                // downgraded and a permanent request always upgrades.
                let extends = match (r.expires, expires) {
                    (0, _) => false,
                    (_, 0) => true,
                    (have, want) => have < want,
                };
                if extends {
                    r.expires = expires;
                    dirty = true;
                }
                r.token.clone()
            });

            (found, dirty)
        };

        if dirty {
            self.store();
        }

        match found {
            Some(token) => Ok(token),
            None => self.create_auth(name, role, expires),
        }
    }

    /// Issues an HS256 JWT carrying name/role/created/expires claims.
    pub fn create_jwt_auth(
        &self,
        name: &str,
        role: &str,
        expires: u64,
    ) -> Result<String> {
        let claims = JwtClaims {
            iss: self.jwt_issuer.clone(),
            name: name.to_string(),
            role: role.to_string(),
            created: now_unix(),
            expires,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.jwt_key),
        )
        .context("signing jwt")
    }

    fn check_jwt(&self, token: &str) -> Option<AuthToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.jwt_issuer]);
        // Expiry lives in a custom claim checked below, not in `exp`.
        validation.set_required_spec_claims(&["iss"]);
        validation.validate_exp = false;

        let data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(&self.jwt_key),
            &validation,
        )
        .ok()?;

        let claims = data.claims;

        if claims.expires != 0 && claims.expires <= now_unix() {
            return None;
        }

        Some(AuthToken { name: claims.name, role: claims.role })
    }

    /// Resolves a presented token: JWT first, then a constant-time scan of
    /// the opaque records. Expired records never match.
    pub fn check_auth_token(&self, token: &str) -> Option<AuthToken> {
        if let Some(t) = self.check_jwt(token) {
            return Some(t);
        }

        let now = now_unix();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        for r in records.iter_mut() {
            if constant_time_eq(r.token.as_bytes(), token.as_bytes()) {
                if !r.is_valid(now) {
                    return None;
                }
                r.accessed = now;
                return Some(AuthToken {
                    name: r.name.clone(),
                    role: r.role.clone(),
                });
            }
        }

        None
    }

    pub fn remove_auth(&self, name: &str) -> bool {
        let removed = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            let before = records.len();
            records.retain(|r| r.name != name);
            records.len() != before
        };

        if removed {
            self.store();
        }

        removed
    }

    /// Drops expired records from memory; they vanish from disk on the
    /// next store cycle.
    pub fn gc_expired(&self) {
        let now = now_unix();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.retain(|r| r.is_valid(now));
    }

    /// Snapshot of records for the list endpoint.
    pub fn records(&self) -> Vec<AuthRecord> {
        let now = now_unix();
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.is_valid(now))
            .cloned()
            .collect()
    }

    /// Persists non-expired records as a JSON array.
    pub fn store(&self) {
        let now = now_unix();
        let valid: Vec<AuthRecord> = {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.iter().filter(|r| r.is_valid(now)).cloned().collect()
        };

        if let Some(parent) = self.db_path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!(error = %e, "could not create session db directory");
            return;
        }

        match serde_json::to_string(&valid) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.db_path, json) {
                    warn!(path = ?self.db_path, error = %e, "could not write session db");
                }
            },
            Err(e) => warn!(error = %e, "could not serialize session db"),
        }
    }

    /// Loads the session db, skipping records that fail to parse.
    pub fn load(&self) {
        let raw = match fs::read_to_string(&self.db_path) {
            Ok(r) => r,
            Err(_) => {
                info!("no session db, skipping loading saved sessions");
                return;
            },
        };

        let parsed: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not parse session db, skipping");
                return;
            },
        };

        let now = now_unix();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.clear();

        for v in parsed {
            match serde_json::from_value::<AuthRecord>(v) {
                Ok(r) if r.is_valid(now) => records.push(r),
                Ok(_) => {},
                Err(e) => warn!(error = %e, "skipping malformed session record"),
            }
        }
    }
}

/// The configured administrator login and where it came from; a login from
/// global config may not be changed through the API.
pub struct AdminLogin {
    pub username: String,
    pub password: String,
    pub from_global_config: bool,
    pub user_config_path: PathBuf,
}

impl AdminLogin {
    pub fn is_configured(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn check(&self, username: &str, password: &str) -> bool {
        if !self.is_configured() {
            return false;
        }

        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        user_ok && pass_ok
    }

    /// Persists a new login to the user config file.
    pub fn set(&mut self, username: &str, password: &str) -> Result<()> {
        self.username = username.to_string();
        self.password = password.to_string();

        if let Some(parent) = self.user_config_path.parent() {
            fs::create_dir_all(parent).context("creating user config directory")?;
        }

        fs::write(
            &self.user_config_path,
            format!("httpd_username={username}\nhttpd_password={password}\n"),
        )
        .context("writing user httpd config")
    }
}
