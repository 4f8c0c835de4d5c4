//! Token secrets and admin credentials.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_EMBED_TOKEN_SECRET: &str = "embed-token-secret";
pub const ARG_ADMIN_USERNAME: &str = "admin-username";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";
pub const ARG_ADMIN_SALES_PASSWORD: &str = "admin-sales-password";
pub const ARG_ADMIN_PREUSERS_PASSWORD: &str = "admin-preusers-password";
pub const ARG_ADMIN_TOKEN_TTL_SECONDS: &str = "admin-token-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_admin_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long("token-secret")
                .help("HMAC secret for admin tokens (and embed tokens unless overridden)")
                .env("ALERTA_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_EMBED_TOKEN_SECRET)
                .long("embed-token-secret")
                .help("HMAC secret for embed tokens")
                .env("ALERTA_EMBED_TOKEN_SECRET")
                .hide_env_values(true),
        )
}

fn with_admin_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_USERNAME)
                .long("admin-username")
                .help("Username for the main admin panel")
                .env("ALERTA_ADMIN_USERNAME"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long("admin-password")
                .help("Password for the main admin panel")
                .env("ALERTA_ADMIN_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ADMIN_SALES_PASSWORD)
                .long("admin-sales-password")
                .help("Password for the sales admin panel")
                .env("ALERTA_ADMIN_SALES_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ADMIN_PREUSERS_PASSWORD)
                .long("admin-preusers-password")
                .help("Password for the pre-users admin panel (defaults to the sales password)")
                .env("ALERTA_ADMIN_PREUSERS_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ADMIN_TOKEN_TTL_SECONDS)
                .long("admin-token-ttl-seconds")
                .help("Admin token and cookie lifetime in seconds")
                .env("ALERTA_ADMIN_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_secret: SecretString,
    pub embed_token_secret: Option<SecretString>,
    pub admin_username: Option<String>,
    pub admin_password: Option<SecretString>,
    pub admin_sales_password: Option<SecretString>,
    pub admin_preusers_password: Option<SecretString>,
    pub admin_token_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the token secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let token_secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .filter(|secret| !secret.trim().is_empty())
            .map(|secret| SecretString::from(secret.clone()))
            .context("missing required argument: --token-secret")?;

        let secret = |name: &str| {
            matches
                .get_one::<String>(name)
                .filter(|value| !value.is_empty())
                .map(|value| SecretString::from(value.clone()))
        };

        Ok(Self {
            token_secret,
            embed_token_secret: secret(ARG_EMBED_TOKEN_SECRET),
            admin_username: matches
                .get_one::<String>(ARG_ADMIN_USERNAME)
                .filter(|value| !value.is_empty())
                .cloned(),
            admin_password: secret(ARG_ADMIN_PASSWORD),
            admin_sales_password: secret(ARG_ADMIN_SALES_PASSWORD),
            admin_preusers_password: secret(ARG_ADMIN_PREUSERS_PASSWORD),
            admin_token_ttl_seconds: matches
                .get_one::<u64>(ARG_ADMIN_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(86_400),
        })
    }
}
