//! Threshold overrides for the rate-limited categories served here.

use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

use crate::rate_limit::{RateLimitCategory, RateLimitPolicies, RateLimitPolicy};

struct Override {
    category: RateLimitCategory,
    max_arg: &'static str,
    max_env: &'static str,
    max_default: &'static str,
    window_arg: &'static str,
    window_env: &'static str,
    window_default: &'static str,
    help: &'static str,
}

const OVERRIDES: [Override; 3] = [
    Override {
        category: RateLimitCategory::Admin,
        max_arg: "admin-rate-limit-max",
        max_env: "ALERTA_ADMIN_RATE_LIMIT_MAX",
        max_default: "5",
        window_arg: "admin-rate-limit-window-seconds",
        window_env: "ALERTA_ADMIN_RATE_LIMIT_WINDOW_SECONDS",
        window_default: "900",
        help: "admin password logins",
    },
    Override {
        category: RateLimitCategory::Auth,
        max_arg: "auth-rate-limit-max",
        max_env: "ALERTA_AUTH_RATE_LIMIT_MAX",
        max_default: "30",
        window_arg: "auth-rate-limit-window-seconds",
        window_env: "ALERTA_AUTH_RATE_LIMIT_WINDOW_SECONDS",
        window_default: "900",
        help: "embed token minting",
    },
    Override {
        category: RateLimitCategory::General,
        max_arg: "general-rate-limit-max",
        max_env: "ALERTA_GENERAL_RATE_LIMIT_MAX",
        max_default: "100",
        window_arg: "general-rate-limit-window-seconds",
        window_env: "ALERTA_GENERAL_RATE_LIMIT_WINDOW_SECONDS",
        window_default: "60",
        help: "session checks and embed verification",
    },
];

#[must_use]
pub fn with_args(command: Command) -> Command {
    OVERRIDES.iter().fold(command, |command, o| {
        command
            .arg(
                Arg::new(o.max_arg)
                    .long(o.max_arg)
                    .help(format!("Requests allowed per window for {}", o.help))
                    .env(o.max_env)
                    .default_value(o.max_default)
                    .value_parser(clap::value_parser!(u32).range(1..)),
            )
            .arg(
                Arg::new(o.window_arg)
                    .long(o.window_arg)
                    .help(format!("Window length in seconds for {}", o.help))
                    .env(o.window_env)
                    .default_value(o.window_default)
                    .value_parser(clap::value_parser!(u64).range(1..)),
            )
    })
}

/// Defaults with the CLI overrides applied.
#[must_use]
pub fn parse(matches: &ArgMatches) -> RateLimitPolicies {
    OVERRIDES
        .iter()
        .fold(RateLimitPolicies::default(), |policies, o| {
            let current = policies.get(o.category);
            let max_requests = matches
                .get_one::<u32>(o.max_arg)
                .copied()
                .unwrap_or(current.max_requests);
            let window = matches
                .get_one::<u64>(o.window_arg)
                .copied()
                .map_or(current.window, Duration::from_secs);
            policies.with(o.category, RateLimitPolicy::new(max_requests, window))
        })
}
