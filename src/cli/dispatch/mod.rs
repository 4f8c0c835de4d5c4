use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, auth, rate_limit},
};
use crate::safe_error::DeploymentMode;
use anyhow::{Context, Result, anyhow};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let mode = matches
        .get_one::<String>(commands::ARG_ENVIRONMENT)
        .map(|value| value.parse::<DeploymentMode>())
        .transpose()
        .map_err(|e| anyhow!(e))?
        .unwrap_or_default();

    let frontend_base_url = matches
        .get_one::<String>(commands::ARG_FRONTEND_BASE_URL)
        .filter(|value| !value.trim().is_empty())
        .cloned();

    let auth = auth::Options::parse(matches)?;
    let rate_limits = rate_limit::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        mode,
        frontend_base_url,
        auth,
        rate_limits,
    }))
}
