use crate::{
    api::{self, AdminCredentials, ApiConfig, AppState},
    cli::commands::auth,
    clock::{Clock, SystemClock},
    premium::PgAccountStore,
    rate_limit::{FixedWindowLimiter, RateLimitPolicies, SWEEP_INTERVAL},
    safe_error::DeploymentMode,
    token::{AdminScope, AdminTokens, EmbedTokens, TokenSigner},
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub mode: DeploymentMode,
    pub frontend_base_url: Option<String>,
    pub auth: auth::Options,
    pub rate_limits: RateLimitPolicies,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, a signer cannot be built or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let admin_signer = TokenSigner::new(&args.auth.token_secret, clock.clone())
        .context("Failed to build admin token signer")?;
    let embed_secret = args
        .auth
        .embed_token_secret
        .as_ref()
        .unwrap_or(&args.auth.token_secret);
    let embed_signer = TokenSigner::new(embed_secret, clock.clone())
        .context("Failed to build embed token signer")?;

    let admin_tokens = AdminTokens::new(admin_signer)
        .with_ttl(Duration::from_secs(args.auth.admin_token_ttl_seconds));
    let embed_tokens = EmbedTokens::new(embed_signer);

    let limiter = Arc::new(FixedWindowLimiter::new(args.rate_limits, clock.clone()));
    let _sweeper = limiter.spawn_sweeper(SWEEP_INTERVAL);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;
    let accounts = Arc::new(PgAccountStore::new(pool));

    let credentials = admin_credentials(args.auth);
    if !credentials.is_configured(AdminScope::Main) {
        warn!("admin credentials are not configured; admin login will fail");
    }

    let mut config = ApiConfig::new().with_mode(args.mode).with_admin(credentials);
    if let Some(origin) = args.frontend_base_url {
        config = config.with_frontend_base_url(origin);
    }

    info!(mode = %args.mode, port = args.port, "starting alerta");

    let state = Arc::new(AppState::new(
        config,
        admin_tokens,
        embed_tokens,
        limiter,
        accounts,
        clock,
    ));

    api::new(args.port, state).await
}

fn admin_credentials(options: auth::Options) -> AdminCredentials {
    let mut credentials = AdminCredentials::new();
    if let Some(username) = options.admin_username {
        credentials = credentials.with_username(username);
    }
    if let Some(password) = options.admin_password {
        credentials = credentials.with_password(password);
    }
    if let Some(password) = options.admin_sales_password {
        credentials = credentials.with_sales_password(password);
    }
    if let Some(password) = options.admin_preusers_password {
        credentials = credentials.with_preusers_password(password);
    }
    credentials
}
