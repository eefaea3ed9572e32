// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::http::StatusCode;
use serde_json::json;

use crate::integration_tests::{
    common::{expect_status, get_admin, get_with_cookie, post_json_admin},
    test_server,
};

#[tokio::test]
async fn test_apikey_lifecycle() {
    let s = test_server();

    // generate
    let token = expect_status(
        &s.router,
        post_json_admin(
            "/auth/apikey/generate",
            json!({"name": "api1", "role": "admin", "duration": 3600}),
        ),
        StatusCode::OK,
    )
    .await;
    assert_eq!(token.trim().len(), 32, "expected 16 hex-encoded bytes");

    // the token authenticates as a cookie
    expect_status(
        &s.router,
        get_with_cookie("/session/check_session", token.trim()),
        StatusCode::OK,
    )
    .await;

    // list shows it (token visible because auth view is enabled)
    let list = expect_status(
        &s.router,
        get_admin("/auth/apikey/list"),
        StatusCode::OK,
    )
    .await;
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(&list).expect("list json");
    let entry = parsed
        .iter()
        .find(|e| e["name"] == "api1")
        .expect("api1 listed");
    assert_eq!(entry["role"], "admin");
    assert_eq!(entry["token"], token.trim());

    // revoke
    let revoked = expect_status(
        &s.router,
        post_json_admin("/auth/apikey/revoke", json!({"name": "api1"})),
        StatusCode::OK,
    )
    .await;
    assert!(revoked.contains("revoked"));

    // the token no longer authenticates
    expect_status(
        &s.router,
        get_with_cookie("/session/check_session", token.trim()),
        StatusCode::UNAUTHORIZED,
    )
    .await;

    // revoking again is an error surfaced as a 500 with a reason
    expect_status(
        &s.router,
        post_json_admin("/auth/apikey/revoke", json!({"name": "api1"})),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;
}

#[tokio::test]
async fn test_opaque_token_survives_restart() {
    let s = test_server();

    let token = expect_status(
        &s.router,
        post_json_admin(
            "/auth/apikey/generate",
            json!({"name": "survivor", "role": "readonly", "duration": 0}),
        ),
        StatusCode::OK,
    )
    .await;

    // a fresh auth store against the same session db sees the token
    let reloaded = wlan_sentry_rs::httpd::auth::AuthStore::new(
        s.home.path().join(".kismet/session.db"),
        "different-key-this-time",
        "kismet",
    )
    .expect("restarted store");

    let hit = reloaded
        .check_auth_token(token.trim())
        .expect("token survives restart");
    assert_eq!(hit.name, "survivor");
    assert_eq!(hit.role, "readonly");
}

#[tokio::test]
async fn test_generate_requires_admin_role() {
    let s = test_server();

    // a readonly key cannot mint more keys
    let ro_token = expect_status(
        &s.router,
        post_json_admin(
            "/auth/apikey/generate",
            json!({"name": "ro", "role": "readonly", "duration": 3600}),
        ),
        StatusCode::OK,
    )
    .await;

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/auth/apikey/generate")
        .header(axum::http::header::COOKIE, format!("KISMET={}", ro_token.trim()))
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({"name": "evil", "role": "admin", "duration": 0}).to_string(),
        ))
        .expect("request");

    expect_status(&s.router, req, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let s = test_server();

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/auth/apikey/generate")
        .header(axum::http::header::AUTHORIZATION,
            crate::integration_tests::common::basic_auth_header())
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .expect("request");

    expect_status(&s.router, req, StatusCode::BAD_REQUEST).await;
}
