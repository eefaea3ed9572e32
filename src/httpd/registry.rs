// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Route registration facade over the axum router.
//!
//! Routes register with a path (`:name` placeholders), verb list, and role
//! list; the facade owns the request lifecycle: variable cache, JSON body,
//! auth resolution (cookie token → JWT → basic auth → query login), role
//! enforcement, and error-to-500 conversion. Verb mismatches return 405
//! from the router itself; role failures return 401.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use axum::{
    Router,
    body::to_bytes,
    extract::{
        Path, Request, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{MethodFilter, MethodRouter, on},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::warn;

use crate::{
    httpd::{
        HttpState,
        auth::{ANY_ROLE, AuthToken, LOGON_ROLE, WEB_LOGON_NAME},
    },
    models::elements::{
        Element, FieldSpec, RenameMap, SerializeFormat, summarize,
    },
    utils::decode_uri,
};

/// Synthesized login cookies are valid this long.
const WEB_SESSION_SECS: u64 = 24 * 3600;
/// Per-request deadline.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);
/// POST body cap.
const BODY_LIMIT: usize = 4 * 1024 * 1024;

pub const AUTH_COOKIE: &str = "KISMET";

/// Per-request context handed to endpoint handlers.
pub struct RequestCtx {
    pub state: Arc<HttpState>,
    pub params: HashMap<String, String>,
    /// Query + form variables, URI-decoded.
    pub vars: HashMap<String, String>,
    pub json: Option<serde_json::Value>,
    pub auth: Option<AuthToken>,
    pub headers: HeaderMap,
}

impl RequestCtx {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Field summarization specs from the request body.
    pub fn field_specs(&self) -> Vec<FieldSpec> {
        let Some(json) = &self.json else {
            return Vec::new();
        };
        let Some(fields) = json.get("fields").and_then(|f| f.as_array()) else {
            return Vec::new();
        };

        fields
            .iter()
            .filter_map(|f| FieldSpec::from_json(f).ok())
            .collect()
    }

    /// Serialization format from a `name.ext` path segment.
    pub fn format_of(&self, target: &str) -> SerializeFormat {
        match target.rsplit_once('.') {
            Some((_, ext)) => SerializeFormat::from_extension(ext),
            None => SerializeFormat::default(),
        }
    }

    /// Renders an element snapshot with summarization applied.
    pub fn element_response(
        &self,
        el: &Element,
        format: SerializeFormat,
    ) -> Response {
        let specs = self.field_specs();
        let (view, renames): (Element, RenameMap) = if specs.is_empty() {
            (el.clone(), RenameMap::new())
        } else {
            summarize(el, &specs, &self.state.registry)
        };

        let body = format.render(&view, &self.state.registry, &renames);

        (
            [(header::CONTENT_TYPE, format.content_type())],
            body,
        )
            .into_response()
    }
}

pub type HandlerResult = anyhow::Result<Response>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
pub type RouteHandler = Arc<dyn Fn(RequestCtx) -> HandlerFuture + Send + Sync>;

/// Plain-text helper responses.
pub fn text_response(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain")],
        body.into(),
    )
        .into_response()
}

/// Websocket endpoint wrapper exposing read/write closures.
pub struct WsEndpoint {
    socket: WebSocket,
}

impl WsEndpoint {
    /// Next text frame; None on close or transport error.
    pub async fn read(&mut self) -> Option<String> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(t)) => return Some(t),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    pub async fn write(&mut self, text: String) -> bool {
        self.socket.send(Message::Text(text)).await.is_ok()
    }
}

pub type WsFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type WsHandler = Arc<dyn Fn(WsEndpoint) -> WsFuture + Send + Sync>;

enum RouteAuth {
    Roles(Vec<String>),
    Unauth,
}

pub struct RouteRegistry {
    state: Arc<HttpState>,
    router: Router,
}

impl RouteRegistry {
    pub fn new(state: Arc<HttpState>) -> Self {
        Self { state, router: Router::new() }
    }

    pub fn state(&self) -> &Arc<HttpState> {
        &self.state
    }

    pub fn register_route(
        &mut self,
        path: &str,
        verbs: &[Method],
        roles: &[&str],
        handler: RouteHandler,
    ) {
        let auth = RouteAuth::Roles(roles.iter().map(|r| r.to_string()).collect());
        self.add_route(path, verbs, auth, handler);
    }

    pub fn register_unauth_route(
        &mut self,
        path: &str,
        verbs: &[Method],
        handler: RouteHandler,
    ) {
        self.add_route(path, verbs, RouteAuth::Unauth, handler);
    }

    fn add_route(
        &mut self,
        path: &str,
        verbs: &[Method],
        auth: RouteAuth,
        handler: RouteHandler,
    ) {
        let auth = Arc::new(auth);
        let mut method_router: MethodRouter<()> = MethodRouter::new();

        for verb in verbs {
            let Some(filter) = method_filter(verb) else {
                warn!(verb = %verb, path, "unsupported route verb, skipping");
                continue;
            };

            let state = Arc::clone(&self.state);
            let handler = Arc::clone(&handler);
            let auth = Arc::clone(&auth);

            method_router = method_router.on(
                filter,
                move |Path(params): Path<HashMap<String, String>>,
                      req: Request| {
                    let state = Arc::clone(&state);
                    let handler = Arc::clone(&handler);
                    let auth = Arc::clone(&auth);
                    async move { dispatch(state, params, req, auth, handler).await }
                },
            );
        }

        self.router = std::mem::take(&mut self.router).route(path, method_router);
    }

    /// Websocket endpoints authenticate like regular routes, then upgrade.
    pub fn register_websocket_route(
        &mut self,
        path: &str,
        roles: &[&str],
        handler: WsHandler,
    ) {
        let roles: Arc<Vec<String>> =
            Arc::new(roles.iter().map(|r| r.to_string()).collect());
        let state = Arc::clone(&self.state);

        let method_router = on(
            MethodFilter::GET,
            move |ws: WebSocketUpgrade, req: Request| {
                let state = Arc::clone(&state);
                let handler = Arc::clone(&handler);
                let roles = Arc::clone(&roles);

                async move {
                    let vars = query_vars(req.uri().query());
                    let (auth, _) = resolve_auth(&state, req.headers(), &vars);

                    if !role_permitted(&auth, &roles) {
                        return text_response(
                            StatusCode::UNAUTHORIZED,
                            "Login required\n",
                        );
                    }

                    ws.on_upgrade(move |socket| handler(WsEndpoint { socket }))
                }
            },
        );

        self.router = std::mem::take(&mut self.router).route(path, method_router);
    }

    /// Static file serving. ServeDir refuses path traversal (`..` and
    /// absolute components never escape the base directory).
    pub fn register_static_dir(&mut self, url_prefix: &str, fs_path: &str) {
        let service = ServeDir::new(fs_path);

        self.router = if url_prefix == "/" {
            std::mem::take(&mut self.router).fallback_service(service)
        } else {
            std::mem::take(&mut self.router)
                .nest_service(url_prefix, service)
        };
    }

    /// Finishes the router: CORS, the request deadline, slash
    /// normalization, URI prefix stripping, and the unknown-path fallback.
    pub fn build(
        self,
        allow_cors: bool,
        allowed_origin: &str,
        uri_prefix: &str,
        redirect_unknown: &str,
    ) -> Router {
        let mut router = self.router;

        if !redirect_unknown.is_empty() {
            let target = redirect_unknown.to_string();
            router = router.fallback(move || {
                let target = target.clone();
                async move { Redirect::temporary(&target).into_response() }
            });
        }

        if !uri_prefix.is_empty() && uri_prefix != "/" {
            router = Router::new().nest(uri_prefix, router);
        }

        if allow_cors {
            let cors = if allowed_origin.is_empty() {
                CorsLayer::permissive()
            } else {
                match allowed_origin.parse::<HeaderValue>() {
                    Ok(origin) => CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods(tower_http::cors::Any)
                        .allow_headers(tower_http::cors::Any),
                    Err(_) => CorsLayer::permissive(),
                }
            };
            router = router.layer(cors);
        }

        router
            .layer(middleware::from_fn(deadline_middleware))
            .layer(middleware::map_request(normalize_slashes))
    }
}

fn method_filter(m: &Method) -> Option<MethodFilter> {
    match *m {
        Method::GET => Some(MethodFilter::GET),
        Method::POST => Some(MethodFilter::POST),
        Method::PUT => Some(MethodFilter::PUT),
        Method::DELETE => Some(MethodFilter::DELETE),
        Method::OPTIONS => Some(MethodFilter::OPTIONS),
        _ => None,
    }
}

/// Collapses duplicate slashes before routing.
async fn normalize_slashes(mut req: Request) -> Request {
    let uri = req.uri();
    let path = uri.path();

    if !path.contains("//") {
        return req;
    }

    let mut normalized = String::with_capacity(path.len());
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !last_slash {
                normalized.push(c);
            }
            last_slash = true;
        } else {
            normalized.push(c);
            last_slash = false;
        }
    }

    let pq = match uri.query() {
        Some(q) => format!("{normalized}?{q}"),
        None => normalized,
    };

    if let Ok(new_uri) = pq.parse() {
        *req.uri_mut() = new_uri;
    }

    req
}

async fn deadline_middleware(req: Request, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_DEADLINE, next.run(req)).await {
        Ok(resp) => resp,
        Err(_) => text_response(StatusCode::REQUEST_TIMEOUT, "Request timed out\n"),
    }
}

fn query_vars(query: Option<&str>) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    if let Some(q) = query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            vars.insert(
                String::from_utf8_lossy(&decode_uri(k, true)).into_owned(),
                String::from_utf8_lossy(&decode_uri(v, true)).into_owned(),
            );
        }
    }

    vars
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie in cookies.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=')
            && name == AUTH_COOKIE
        {
            return Some(value.to_string());
        }
    }

    None
}

fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Resolves the session: cookie/query token (JWT or opaque), then basic
/// auth, then `user=&password=` query login. A successful password login
/// synthesizes an admin JWT cookie good for 24 hours.
pub fn resolve_auth(
    state: &Arc<HttpState>,
    headers: &HeaderMap,
    vars: &HashMap<String, String>,
) -> (Option<AuthToken>, Option<String>) {
    if let Some(token) =
        cookie_token(headers).or_else(|| vars.get(AUTH_COOKIE).cloned())
        && let Some(auth) = state.auth.check_auth_token(&token)
    {
        return (Some(auth), None);
    }

    let login = basic_auth(headers).or_else(|| {
        match (vars.get("user"), vars.get("password")) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    });

    if let Some((user, pass)) = login {
        let valid = {
            let admin = state.admin.lock().unwrap_or_else(|e| e.into_inner());
            admin.check(&user, &pass)
        };

        if valid {
            let expires = crate::utils::now_unix() + WEB_SESSION_SECS;
            let cookie = state
                .auth
                .create_jwt_auth(WEB_LOGON_NAME, LOGON_ROLE, expires)
                .ok()
                .map(|jwt| format!("{AUTH_COOKIE}={jwt}; Path=/; HttpOnly"));

            return (
                Some(AuthToken {
                    name: WEB_LOGON_NAME.to_string(),
                    role: LOGON_ROLE.to_string(),
                }),
                cookie,
            );
        }
    }

    (None, None)
}

fn role_permitted(auth: &Option<AuthToken>, roles: &[String]) -> bool {
    let Some(auth) = auth else {
        return false;
    };

    // The admin role passes every route.
    if auth.role.eq_ignore_ascii_case(LOGON_ROLE) {
        return true;
    }

    roles
        .iter()
        .any(|r| r == ANY_ROLE || r.eq_ignore_ascii_case(&auth.role))
}

async fn dispatch(
    state: Arc<HttpState>,
    params: HashMap<String, String>,
    req: Request,
    auth_mode: Arc<RouteAuth>,
    handler: RouteHandler,
) -> Response {
    let (parts, body) = req.into_parts();
    let headers = parts.headers;

    let mut vars = query_vars(parts.uri.query());

    let body_bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(b) => b,
        Err(_) => {
            return text_response(StatusCode::BAD_REQUEST, "Unreadable body\n");
        },
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut json = None;

    if content_type.starts_with("application/json") {
        match serde_json::from_slice(&body_bytes) {
            Ok(v) => json = Some(v),
            Err(e) => {
                return text_response(
                    StatusCode::BAD_REQUEST,
                    format!("Malformed JSON: {e}\n"),
                );
            },
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = String::from_utf8_lossy(&body_bytes);
        for (k, v) in query_vars(Some(&text)) {
            vars.insert(k, v);
        }
    }

    // Form posts may carry the JSON command document in a `json` variable.
    if json.is_none()
        && let Some(raw) = vars.get("json")
        && let Ok(v) = serde_json::from_str(raw)
    {
        json = Some(v);
    }

    let (auth, set_cookie) = resolve_auth(&state, &headers, &vars);

    if let RouteAuth::Roles(roles) = auth_mode.as_ref()
        && !role_permitted(&auth, roles)
    {
        return text_response(StatusCode::UNAUTHORIZED, "Login required\n");
    }

    let ctx = RequestCtx { state, params, vars, json, auth, headers };

    let mut response = match handler(ctx).await {
        Ok(r) => r,
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")),
    };

    if let Some(cookie) = set_cookie
        && let Ok(value) = cookie.parse()
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }

    response
}
