//! Embed tokens for premium third-party content (AGGR, liquidation tracker).
//!
//! `generate-token` is called by the signed-in frontend. `verify-token` is
//! called cross-origin by the embedded app before it renders anything.

use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, info};
use utoipa::ToSchema;

use super::utils::{audit_context, client_identity, enforce_rate_limit, error_response};
use crate::{
    api::AppState,
    audit::{self, AuditEvent},
    rate_limit::RateLimitCategory,
    token::{EMBED_TOKEN_TTL, EmbedType},
};

const GENERATE_PATH: &str = "/api/embed/generate-token";
const VERIFY_PATH: &str = "/api/embed/verify-token";

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct EmbedTokenRequest {
    /// `aggr` or `liquidation`.
    #[serde(default, rename = "type")]
    pub embed_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTokenResponse {
    pub token: String,
    pub expires_in: u64,
    #[serde(rename = "type")]
    pub embed_type: EmbedType,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "type")]
    pub embed_type: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub user_id: i64,
    pub email: String,
    #[serde(rename = "type")]
    pub embed_type: EmbedType,
    pub remaining_seconds: u64,
}

#[utoipa::path(
    post,
    path = "/api/embed/generate-token",
    request_body = EmbedTokenRequest,
    responses(
        (status = 200, description = "Embed token minted", body = EmbedTokenResponse),
        (status = 400, description = "Invalid embed type"),
        (status = 401, description = "No user identity"),
        (status = 403, description = "User has no premium access"),
        (status = 404, description = "User not found"),
        (status = 429, description = "Too many requests")
    ),
    tag = "embed"
)]
pub async fn generate_token(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<EmbedTokenRequest>>,
) -> impl IntoResponse {
    let client = client_identity(&headers, connect.map(|ConnectInfo(addr)| addr));
    if let Err(response) =
        enforce_rate_limit(&state, &headers, &client, RateLimitCategory::Auth, GENERATE_PATH)
    {
        return response;
    }

    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let Some(email) = request.email.as_deref().map(str::trim).filter(|email| !email.is_empty())
    else {
        debug!("Embed token requested without a user identity");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            Some("UNAUTHORIZED"),
        );
    };

    let Some(embed_type) = request
        .embed_type
        .as_deref()
        .and_then(|value| value.parse::<EmbedType>().ok())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            r#"Invalid embed type. Must be "aggr" or "liquidation""#,
            Some("INVALID_TYPE"),
        );
    };

    let account = match state.accounts().find_by_email(email).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            debug!("Embed token requested for unknown user");
            return error_response(StatusCode::NOT_FOUND, "User not found", Some("USER_NOT_FOUND"));
        }
        Err(err) => {
            error!("Failed to look up account: {err}");
            return internal_error(&state, &err, "Failed to generate token");
        }
    };

    if !account.has_premium_access(state.now()) {
        info!(user_id = account.id, plan = ?account.plan, "Embed token denied without premium access");
        return error_response(
            StatusCode::FORBIDDEN,
            "Premium access required",
            Some("PREMIUM_REQUIRED"),
        );
    }

    let minted = match state.embed_tokens().issue(account.id, email, embed_type) {
        Ok(minted) => minted,
        Err(err) => {
            error!("Failed to mint embed token: {err}");
            return internal_error(&state, &err, "Failed to generate token");
        }
    };

    audit::record(
        AuditEvent::EmbedTokenIssued {
            user_id: account.id,
            embed_type,
        },
        &audit_context(&headers, &client),
    );

    let body = EmbedTokenResponse {
        token: minted.token,
        expires_in: EMBED_TOKEN_TTL.as_secs(),
        embed_type,
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/embed/verify-token",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "Token is valid and the user still has premium access", body = VerifyTokenResponse),
        (status = 400, description = "Token missing or body unreadable"),
        (status = 401, description = "Token invalid, expired, of another type, or premium revoked"),
        (status = 429, description = "Too many requests")
    ),
    tag = "embed"
)]
pub async fn verify_token(
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyTokenRequest>>,
) -> impl IntoResponse {
    let client = client_identity(&headers, connect.map(|ConnectInfo(addr)| addr));
    if let Err(response) =
        enforce_rate_limit(&state, &headers, &client, RateLimitCategory::General, VERIFY_PATH)
    {
        return response;
    }

    let Some(Json(request)) = payload else {
        return invalid(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    let Some(token) = request.token.as_deref().filter(|token| !token.trim().is_empty()) else {
        return invalid(StatusCode::BAD_REQUEST, "Token is required");
    };

    let envelope = match state.embed_tokens().verify(token) {
        Ok(envelope) => envelope,
        Err(failure) => {
            let reason = failure.to_string();
            debug!(reason = failure.kind(), "Embed token rejected");
            audit::record(
                AuditEvent::TokenRejected {
                    kind: failure.kind(),
                    reason: &reason,
                },
                &audit_context(&headers, &client),
            );
            return invalid(StatusCode::UNAUTHORIZED, &reason);
        }
    };
    let claims = &envelope.claims;

    if let Some(expected) = request.embed_type.as_deref().filter(|value| !value.is_empty()) {
        if expected != claims.embed_type.as_str() {
            debug!(expected, actual = %claims.embed_type, "Embed token type mismatch");
            return invalid(StatusCode::UNAUTHORIZED, "Token type mismatch");
        }
    }

    // Entitlement can be revoked after minting.
    match state.accounts().find_by_id(claims.user_id).await {
        Ok(Some(account)) if account.has_premium_access(state.now()) => {}
        Ok(Some(account)) => {
            info!(user_id = account.id, "Embed token holder no longer has premium access");
            return invalid(StatusCode::UNAUTHORIZED, "Premium access revoked");
        }
        Ok(None) => return invalid(StatusCode::UNAUTHORIZED, "User not found"),
        Err(err) => {
            error!("Failed to look up account: {err}");
            let message = state.errors().format(&err, "Verification failed");
            return invalid(StatusCode::INTERNAL_SERVER_ERROR, &message);
        }
    }

    let body = VerifyTokenResponse {
        valid: true,
        user_id: claims.user_id,
        email: claims.email.clone(),
        embed_type: claims.embed_type,
        remaining_seconds: state.embed_tokens().remaining_seconds(&envelope),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn invalid(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "valid": false, "error": message }))).into_response()
}

fn internal_error<E: crate::safe_error::ErrorDetail + ?Sized>(
    state: &AppState,
    err: &E,
    generic: &str,
) -> Response {
    let body = state.errors().body(err, Some(generic), Some("INTERNAL_ERROR"));
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
