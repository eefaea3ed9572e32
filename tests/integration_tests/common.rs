// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request helpers shared by the HTTP integration tests.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tower::ServiceExt;

use crate::integration_tests::{ADMIN_PASS, ADMIN_USER};

pub async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.expect("router call")
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), 16 * 1024 * 1024)
        .await
        .expect("read body");
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn get_admin(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth_header())
        .body(Body::empty())
        .expect("request")
}

pub fn post_json_admin(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth_header())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("KISMET={token}"))
        .body(Body::empty())
        .expect("request")
}

pub fn basic_auth_header() -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{ADMIN_USER}:{ADMIN_PASS}"))
    )
}

pub async fn expect_status(
    router: &Router,
    req: Request<Body>,
    status: StatusCode,
) -> String {
    let resp = send(router, req).await;
    let got = resp.status();
    let body = body_string(resp).await;
    assert_eq!(got, status, "unexpected status, body: {body}");
    body
}
