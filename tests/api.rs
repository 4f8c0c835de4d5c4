//! Router-level tests: every request goes through the full middleware stack
//! with an in-memory account table and a manual clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use alerta::{
    api::{self, AdminCredentials, ApiConfig, AppState},
    clock::ManualClock,
    premium::{Account, MemoryAccountStore, Plan},
    rate_limit::{FixedWindowLimiter, NoopRateLimiter, RateLimitPolicies, RateLimiter},
    safe_error::DeploymentMode,
    token::{AdminTokens, EmbedTokens, TokenSigner},
};
use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const NOW: i64 = 1_700_000_000_000;
const PREMIUM_EMAIL: &str = "premium@example.com";
const FREE_EMAIL: &str = "free@example.com";

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    accounts: Arc<MemoryAccountStore>,
}

fn harness() -> Result<Harness> {
    harness_with(DeploymentMode::Development, true)
}

fn harness_with(mode: DeploymentMode, throttled: bool) -> Result<Harness> {
    let clock = Arc::new(ManualClock::new(NOW));
    let admin_signer = TokenSigner::new(&SecretString::from("admin-secret".to_string()), clock.clone())?;
    let embed_signer = TokenSigner::new(&SecretString::from("embed-secret".to_string()), clock.clone())?;

    let accounts = Arc::new(MemoryAccountStore::new());
    let expiry = Utc
        .with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .expect("valid date");
    accounts.insert(Account::new(1, PREMIUM_EMAIL, Plan::Premium).with_expiry(expiry));
    accounts.insert(Account::new(2, FREE_EMAIL, Plan::Free));

    // Sales and preusers stay unconfigured in production.
    let mut credentials = AdminCredentials::new()
        .with_username("root")
        .with_password(SecretString::from("main-pass".to_string()));
    if mode == DeploymentMode::Development {
        credentials = credentials.with_sales_password(SecretString::from("sales-pass".to_string()));
    }
    let config = ApiConfig::new().with_mode(mode).with_admin(credentials);

    let limiter: Arc<dyn RateLimiter> = if throttled {
        Arc::new(FixedWindowLimiter::new(
            RateLimitPolicies::default(),
            clock.clone(),
        ))
    } else {
        Arc::new(NoopRateLimiter)
    };

    let state = Arc::new(AppState::new(
        config,
        AdminTokens::new(admin_signer),
        EmbedTokens::new(embed_signer),
        limiter,
        accounts.clone(),
        clock.clone(),
    ));

    Ok(Harness {
        app: api::router(state)?,
        clock,
        accounts,
    })
}

fn post_json(uri: &str, client: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn get_with_cookie(uri: &str, client: &str, cookie: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header("x-forwarded-for", client)
        .body(Body::empty())?)
}

async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `name=value` part of the Set-Cookie header.
fn cookie_pair(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

async fn embed_token(app: &Router, client: &str, email: &str, kind: &str) -> Result<Value> {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/embed/generate-token",
            client,
            &json!({ "email": email, "type": kind }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn admin_login_sets_a_scoped_cookie() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.1",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("set-cookie");
    assert!(set_cookie.starts_with("admin_auth="));
    assert!(set_cookie.contains("Path=/admin;"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=86400"));

    let body = json_body(response).await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["scope"], json!("main"));
    assert_eq!(body["expiresAt"], json!(NOW + 86_400_000));
    Ok(())
}

#[tokio::test]
async fn session_accepts_own_scope_and_rejects_others() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/sales/auth",
            "10.0.0.2",
            &json!({ "password": "sales-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = cookie_pair(&response).expect("sales cookie");
    assert!(cookie.starts_with("admin_sales_auth="));

    let response = h
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/sales/session", "10.0.0.2", &cookie)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["authenticated"], json!(true));
    assert_eq!(body["scope"], json!("sales"));

    // Same token presented as the main cookie.
    let token = cookie.trim_start_matches("admin_sales_auth=");
    let response = h
        .app
        .clone()
        .oneshot(get_with_cookie(
            "/admin/session",
            "10.0.0.2",
            &format!("admin_auth={token}"),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["code"], json!("UNAUTHORIZED"));
    Ok(())
}

#[tokio::test]
async fn admin_session_expires_after_a_day() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.3",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    let cookie = cookie_pair(&response).expect("main cookie");

    h.clock.advance(Duration::from_secs(24 * 60 * 60));
    let response = h
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/session", "10.0.0.3", &cookie)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_unauthorized_and_missing_fields_are_bad_requests() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.4",
            &json!({ "username": "root", "password": "nope" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = json_body(response).await?;
    assert_eq!(body["error"], json!("Invalid credentials"));

    let response = h
        .app
        .clone()
        .oneshot(post_json("/admin/login", "10.0.0.4", &json!({ "password": "main-pass" }))?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn sixth_admin_attempt_is_rate_limited() -> Result<()> {
    let h = harness()?;
    for _ in 0..5 {
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                "/admin/login",
                "10.0.0.5",
                &json!({ "username": "root", "password": "wrong" }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    h.clock.advance(Duration::from_secs(60));
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.5",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("840")
    );
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok()),
        Some("0")
    );

    // Other clients are unaffected.
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.6",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // A new window opens once the old one ends.
    h.clock.advance(Duration::from_secs(14 * 60));
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.0.0.5",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn embed_token_round_trip_and_expiry() -> Result<()> {
    let h = harness()?;
    let minted = embed_token(&h.app, "10.1.0.1", PREMIUM_EMAIL, "aggr").await?;
    assert_eq!(minted["expiresIn"], json!(300));
    assert_eq!(minted["type"], json!("aggr"));
    let token = minted["token"].as_str().expect("token").to_string();

    h.clock.advance(Duration::from_secs(4 * 60));
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/embed/verify-token",
            "10.1.0.2",
            &json!({ "token": token, "type": "aggr" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["valid"], json!(true));
    assert_eq!(body["userId"], json!(1));
    assert_eq!(body["email"], json!(PREMIUM_EMAIL));
    assert_eq!(body["remainingSeconds"], json!(60));

    h.clock.advance(Duration::from_secs(2 * 60));
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/embed/verify-token",
            "10.1.0.2",
            &json!({ "token": token }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["valid"], json!(false));
    assert_eq!(body["error"], json!("token expired"));
    Ok(())
}

#[tokio::test]
async fn embed_token_type_mismatch_and_tampering_are_rejected() -> Result<()> {
    let h = harness()?;
    let minted = embed_token(&h.app, "10.2.0.1", PREMIUM_EMAIL, "liquidation").await?;
    let token = minted["token"].as_str().expect("token").to_string();

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/embed/verify-token",
            "10.2.0.2",
            &json!({ "token": token, "type": "aggr" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["error"], json!("Token type mismatch"));

    let (payload, _signature) = token.split_once('.').expect("two parts");
    let forged = format!("{payload}.AAAA");
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/embed/verify-token",
            "10.2.0.2",
            &json!({ "token": forged }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["error"], json!("invalid signature"));
    Ok(())
}

#[tokio::test]
async fn revoked_premium_fails_verification() -> Result<()> {
    let h = harness()?;
    let minted = embed_token(&h.app, "10.3.0.1", PREMIUM_EMAIL, "aggr").await?;
    let token = minted["token"].as_str().expect("token").to_string();

    h.accounts
        .insert(Account::new(1, PREMIUM_EMAIL, Plan::Free));

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/embed/verify-token",
            "10.3.0.2",
            &json!({ "token": token }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["error"], json!("Premium access revoked"));
    Ok(())
}

#[tokio::test]
async fn generate_token_error_statuses() -> Result<()> {
    let h = harness()?;
    let cases = [
        (json!({ "type": "aggr" }), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        (
            json!({ "email": PREMIUM_EMAIL, "type": "orderbook" }),
            StatusCode::BAD_REQUEST,
            "INVALID_TYPE",
        ),
        (
            json!({ "email": "ghost@example.com", "type": "aggr" }),
            StatusCode::NOT_FOUND,
            "USER_NOT_FOUND",
        ),
        (
            json!({ "email": FREE_EMAIL, "type": "aggr" }),
            StatusCode::FORBIDDEN,
            "PREMIUM_REQUIRED",
        ),
    ];

    for (request, status, code) in cases {
        let response = h
            .app
            .clone()
            .oneshot(post_json("/api/embed/generate-token", "10.4.0.1", &request)?)
            .await?;
        assert_eq!(response.status(), status, "{request}");
        let body = json_body(response).await?;
        assert_eq!(body["code"], json!(code));
    }
    Ok(())
}

#[tokio::test]
async fn verify_token_requires_a_token() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(post_json("/api/embed/verify-token", "10.5.0.1", &json!({}))?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert_eq!(body["error"], json!("Token is required"));
    Ok(())
}

#[tokio::test]
async fn request_id_is_generated_and_propagated() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(generated.len(), 26);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let h = harness()?;
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert!(body["paths"]["/api/embed/verify-token"].is_object());
    assert!(body["paths"]["/admin/login"].is_object());
    Ok(())
}

#[tokio::test]
async fn production_login_sets_a_secure_cookie() -> Result<()> {
    let h = harness_with(DeploymentMode::Production, true)?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            "10.6.0.1",
            &json!({ "username": "root", "password": "main-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(set_cookie.starts_with("admin_auth="));
    assert!(set_cookie.ends_with("; Secure"), "{set_cookie}");
    Ok(())
}

#[tokio::test]
async fn production_hides_unconfigured_credentials() -> Result<()> {
    let h = harness_with(DeploymentMode::Production, true)?;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/admin/sales/auth",
            "10.6.0.2",
            &json!({ "password": "anything" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await?;
    assert_eq!(
        body,
        json!({
            "error": "An error occurred. Please try again later.",
            "code": "INTERNAL_ERROR",
        })
    );
    Ok(())
}

#[tokio::test]
async fn unthrottled_router_never_returns_429() -> Result<()> {
    let h = harness_with(DeploymentMode::Development, false)?;
    for _ in 0..10 {
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                "/admin/login",
                "10.7.0.1",
                &json!({ "username": "root", "password": "wrong" }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    Ok(())
}
