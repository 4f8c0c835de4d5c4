//! Admin panel login, session and logout for each scope.
//!
//! Flow Overview:
//! 1) Login checks the `admin` rate limit, then the scope's credentials in
//!    constant time.
//! 2) On success an admin token is minted and set as an `HttpOnly` cookie
//!    restricted to the scope's path.
//! 3) Session checks read the scope cookie (or a bearer token) and require
//!    the token's scope to match the route's scope.

use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::utils::{audit_context, client_identity, enforce_rate_limit, error_response};
use crate::{
    api::{AppState, ApiConfig},
    audit::{self, AuditEvent},
    rate_limit::RateLimitCategory,
    token::{AdminAuthError, AdminScope},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AdminPasswordRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginResponse {
    pub success: bool,
    pub scope: AdminScope,
    pub expires_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionResponse {
    pub authenticated: bool,
    pub scope: AdminScope,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = AdminLoginRequest,
    responses(
        (status = 200, description = "Main admin session started", body = AdminLoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "admin"
)]
pub async fn login(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<AdminLoginRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let peer = connect.map(|ConnectInfo(addr)| addr);
    authenticate(
        &state,
        &headers,
        peer,
        AdminScope::Main,
        request.username.as_deref(),
        request.password.as_deref(),
    )
}

#[utoipa::path(
    post,
    path = "/admin/sales/auth",
    request_body = AdminPasswordRequest,
    responses(
        (status = 200, description = "Sales admin session started", body = AdminLoginResponse),
        (status = 400, description = "Missing password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "admin"
)]
pub async fn sales_auth(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<AdminPasswordRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let peer = connect.map(|ConnectInfo(addr)| addr);
    authenticate(
        &state,
        &headers,
        peer,
        AdminScope::Sales,
        None,
        request.password.as_deref(),
    )
}

#[utoipa::path(
    post,
    path = "/admin/preusers/auth",
    request_body = AdminPasswordRequest,
    responses(
        (status = 200, description = "Pre-users admin session started", body = AdminLoginResponse),
        (status = 400, description = "Missing password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "admin"
)]
pub async fn preusers_auth(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<AdminPasswordRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let peer = connect.map(|ConnectInfo(addr)| addr);
    authenticate(
        &state,
        &headers,
        peer,
        AdminScope::Preusers,
        None,
        request.password.as_deref(),
    )
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    scope: AdminScope,
    username: Option<&str>,
    password: Option<&str>,
) -> Response {
    let client = client_identity(headers, peer);
    let endpoint = login_path(scope);
    if let Err(response) =
        enforce_rate_limit(state, headers, &client, RateLimitCategory::Admin, endpoint)
    {
        return response;
    }

    let password = password.filter(|value| !value.is_empty());
    let username = username.filter(|value| !value.is_empty());
    let Some(password) = password else {
        return error_response(StatusCode::BAD_REQUEST, missing_fields_message(scope), None);
    };
    if scope == AdminScope::Main && username.is_none() {
        return error_response(StatusCode::BAD_REQUEST, missing_fields_message(scope), None);
    }

    let Some(matched) = state.config().admin().matches(scope, username, password) else {
        error!(%scope, "Admin credentials are not configured");
        let body = state.errors().body(
            "admin credentials are not configured",
            None,
            Some("INTERNAL_ERROR"),
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    };

    let context = audit_context(headers, &client);
    if !matched {
        audit::record(AuditEvent::AdminLoginFailed { scope }, &context);
        return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials", None);
    }

    let minted = match state.admin_tokens().issue(scope) {
        Ok(minted) => minted,
        Err(err) => {
            error!("Failed to mint admin token: {err}");
            let body = state.errors().body(&err, None, Some("INTERNAL_ERROR"));
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    let max_age = state.admin_tokens().ttl().as_secs();
    let cookie = match admin_cookie(state.config(), scope, &minted.token, max_age) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build admin cookie: {err}");
            let body = state.errors().body(&err.to_string(), None, Some("INTERNAL_ERROR"));
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    audit::record(AuditEvent::AdminLogin { scope }, &context);
    info!(%scope, "Admin session started");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    let body = AdminLoginResponse {
        success: true,
        scope,
        expires_at: minted.envelope.expires_at,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[utoipa::path(
    get,
    path = "/admin/session",
    responses(
        (status = 200, description = "Main admin session is active", body = AdminSessionResponse),
        (status = 401, description = "No valid main admin token")
    ),
    tag = "admin"
)]
pub async fn main_session(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let peer = connect.map(|ConnectInfo(addr)| addr);
    session(&state, &headers, peer, AdminScope::Main)
}

#[utoipa::path(
    get,
    path = "/admin/sales/session",
    responses(
        (status = 200, description = "Sales admin session is active", body = AdminSessionResponse),
        (status = 401, description = "No valid sales admin token")
    ),
    tag = "admin"
)]
pub async fn sales_session(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let peer = connect.map(|ConnectInfo(addr)| addr);
    session(&state, &headers, peer, AdminScope::Sales)
}

#[utoipa::path(
    get,
    path = "/admin/preusers/session",
    responses(
        (status = 200, description = "Pre-users admin session is active", body = AdminSessionResponse),
        (status = 401, description = "No valid pre-users admin token")
    ),
    tag = "admin"
)]
pub async fn preusers_session(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let peer = connect.map(|ConnectInfo(addr)| addr);
    session(&state, &headers, peer, AdminScope::Preusers)
}

fn session(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    scope: AdminScope,
) -> Response {
    let client = client_identity(headers, peer);
    let endpoint = session_path(scope);
    if let Err(response) =
        enforce_rate_limit(state, headers, &client, RateLimitCategory::General, endpoint)
    {
        return response;
    }

    let Some(token) = extract_admin_token(headers, scope) else {
        return unauthorized();
    };

    match state.admin_tokens().authorize(&token, scope) {
        Ok(envelope) => {
            let body = AdminSessionResponse {
                authenticated: true,
                scope: envelope.claims.scope,
                issued_at: envelope.issued_at,
                expires_at: envelope.expires_at,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(AdminAuthError::Invalid(failure)) => {
            debug!(%scope, reason = failure.kind(), "Admin token rejected");
            audit::record(
                AuditEvent::TokenRejected {
                    kind: failure.kind(),
                    reason: &failure.to_string(),
                },
                &audit_context(headers, &client),
            );
            unauthorized()
        }
        Err(err @ AdminAuthError::ScopeMismatch { .. }) => {
            warn!(%scope, "Admin token scope mismatch: {err}");
            audit::record(
                AuditEvent::TokenRejected {
                    kind: "scope_mismatch",
                    reason: &err.to_string(),
                },
                &audit_context(headers, &client),
            );
            unauthorized()
        }
    }
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses((status = 204, description = "Main admin cookie cleared")),
    tag = "admin"
)]
pub async fn main_logout(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    logout(state.config(), AdminScope::Main)
}

#[utoipa::path(
    post,
    path = "/admin/sales/logout",
    responses((status = 204, description = "Sales admin cookie cleared")),
    tag = "admin"
)]
pub async fn sales_logout(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    logout(state.config(), AdminScope::Sales)
}

#[utoipa::path(
    post,
    path = "/admin/preusers/logout",
    responses((status = 204, description = "Pre-users admin cookie cleared")),
    tag = "admin"
)]
pub async fn preusers_logout(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    logout(state.config(), AdminScope::Preusers)
}

fn logout(config: &ApiConfig, scope: AdminScope) -> Response {
    // Tokens are stateless; clearing the cookie is all logout can do.
    let mut response_headers = HeaderMap::new();
    match clear_admin_cookie(config, scope) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!(%scope, "Failed to build clearing admin cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized", Some("UNAUTHORIZED"))
}

const fn login_path(scope: AdminScope) -> &'static str {
    match scope {
        AdminScope::Main => "/admin/login",
        AdminScope::Sales => "/admin/sales/auth",
        AdminScope::Preusers => "/admin/preusers/auth",
    }
}

const fn session_path(scope: AdminScope) -> &'static str {
    match scope {
        AdminScope::Main => "/admin/session",
        AdminScope::Sales => "/admin/sales/session",
        AdminScope::Preusers => "/admin/preusers/session",
    }
}

const fn missing_fields_message(scope: AdminScope) -> &'static str {
    match scope {
        AdminScope::Main => "Username and password are required",
        AdminScope::Sales | AdminScope::Preusers => "Password is required",
    }
}

/// Build the `HttpOnly` cookie carrying an admin token for `scope`.
pub(crate) fn admin_cookie(
    config: &ApiConfig,
    scope: AdminScope,
    token: &str,
    max_age_seconds: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={token}; Path={}; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}",
        scope.cookie_name(),
        scope.cookie_path()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_admin_cookie(config: &ApiConfig, scope: AdminScope) -> Result<HeaderValue, InvalidHeaderValue> {
    admin_cookie(config, scope, "", 0)
}

/// Bearer token first, then the scope's cookie.
pub(crate) fn extract_admin_token(headers: &HeaderMap, scope: AdminScope) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let name = scope.cookie_name();
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
        .find(|value| !value.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
