//! Request helpers shared by the handlers.

use axum::{
    Json,
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{RETRY_AFTER, USER_AGENT},
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat};
use serde_json::json;
use std::{net::SocketAddr, time::Duration};
use tracing::warn;

use crate::{
    api::AppState,
    audit::{self, AuditContext, AuditEvent},
    rate_limit::{RateLimitCategory, RateLimitDecision},
};

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the caller's address for rate limiting and audit.
///
/// Proxy headers win over the socket peer: `x-forwarded-for` (first entry),
/// `x-real-ip`, `cf-connecting-ip`, then the TCP peer.
pub(crate) fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("cf-connecting-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub(crate) fn audit_context(headers: &HeaderMap, client: &str) -> AuditContext {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    AuditContext::new(client, user_agent)
}

/// Count the hit and build the 429 response when over the limit.
pub(crate) fn enforce_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    client: &str,
    category: RateLimitCategory,
    endpoint: &str,
) -> Result<(), Response> {
    match state.rate_limiter().check(client, category) {
        RateLimitDecision::Allowed { .. } => Ok(()),
        RateLimitDecision::Limited {
            limit,
            reset_at_ms,
            retry_after,
        } => {
            warn!(client, %category, endpoint, "Rate limit exceeded");
            audit::record(
                AuditEvent::RateLimitExceeded { category, endpoint },
                &audit_context(headers, client),
            );
            Err(too_many_requests(limit, reset_at_ms, retry_after))
        }
    }
}

pub(crate) fn too_many_requests(limit: u32, reset_at_ms: i64, retry_after: Duration) -> Response {
    let retry_after_secs = ceil_seconds(retry_after);
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from_static("0"),
    );
    if let Some(reset) = DateTime::from_timestamp_millis(reset_at_ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .and_then(|at| HeaderValue::from_str(&at).ok())
    {
        headers.insert(HeaderName::from_static("x-ratelimit-reset"), reset);
    }

    let body = json!({
        "error": RATE_LIMIT_MESSAGE,
        "retryAfter": retry_after_secs,
    });
    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

/// `{ "error": message, "code": code }` with the given status.
pub(crate) fn error_response(status: StatusCode, message: &str, code: Option<&str>) -> Response {
    let body = match code {
        Some(code) => json!({ "error": message, "code": code }),
        None => json!({ "error": message }),
    };
    (status, Json(body)).into_response()
}
