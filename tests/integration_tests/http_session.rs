// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::http::{StatusCode, header};

use crate::integration_tests::{
    common::{body_string, expect_status, get, get_admin, send},
    test_server,
};

#[tokio::test]
async fn test_check_setup_ok_reports_global_config() {
    let s = test_server();

    // login lives in the global config: 406
    expect_status(
        &s.router,
        get("/session/check_setup_ok"),
        StatusCode::NOT_ACCEPTABLE,
    )
    .await;
}

#[tokio::test]
async fn test_check_login_requires_auth() {
    let s = test_server();

    expect_status(&s.router, get("/session/check_login"), StatusCode::UNAUTHORIZED)
        .await;

    let body = expect_status(
        &s.router,
        get_admin("/session/check_login"),
        StatusCode::OK,
    )
    .await;
    assert!(body.contains("Login valid"));
}

#[tokio::test]
async fn test_login_synthesizes_session_cookie() {
    let s = test_server();

    let resp = send(&s.router, get_admin("/session/check_login")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie set")
        .to_str()
        .expect("cookie str")
        .to_string();
    assert!(cookie.starts_with("KISMET="));

    // the synthesized JWT cookie authenticates on its own
    let token = cookie
        .trim_start_matches("KISMET=")
        .split(';')
        .next()
        .expect("token")
        .to_string();

    let body = expect_status(
        &s.router,
        crate::integration_tests::common::get_with_cookie(
            "/session/check_session",
            &token,
        ),
        StatusCode::OK,
    )
    .await;
    assert!(body.contains("Session valid"));
}

#[tokio::test]
async fn test_query_parameter_login() {
    let s = test_server();

    expect_status(
        &s.router,
        get("/session/check_login?user=admin&password=hunter2"),
        StatusCode::OK,
    )
    .await;

    expect_status(
        &s.router,
        get("/session/check_login?user=admin&password=wrong"),
        StatusCode::UNAUTHORIZED,
    )
    .await;
}

#[tokio::test]
async fn test_set_password_refused_for_global_config() {
    let s = test_server();

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/session/set_password")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(axum::body::Body::from("username=x&password=y"))
        .expect("request");

    expect_status(&s.router, req, StatusCode::FORBIDDEN).await;
}

#[tokio::test]
async fn test_verb_mismatch_is_405() {
    let s = test_server();

    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri("/session/check_setup_ok")
        .body(axum::body::Body::empty())
        .expect("request");

    let resp = send(&s.router, req).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let s = test_server();

    let resp = send(&s.router, get("/no/such/endpoint")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_slashes_normalized() {
    let s = test_server();

    let resp = send(&s.router, get("//session///check_setup_ok")).await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
    let _ = body_string(resp).await;
}
