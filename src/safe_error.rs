//! Client-facing error messages.
//!
//! Production responses carry only the caller-supplied generic text. Outside
//! production the most specific message available is returned to ease
//! debugging. Logging the full error is left to the caller.

use serde_json::{Map, Value, json};
use std::{fmt, str::FromStr};

use crate::premium::StoreError;
use crate::token::{AdminAuthError, TokenError, VerifyFailure};

pub const DEFAULT_GENERIC_MESSAGE: &str = "An error occurred. Please try again later.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    #[default]
    Production,
    Development,
}

impl DeploymentMode {
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!(
                "unknown environment: {other} (expected production or development)"
            )),
        }
    }
}

/// Something that may carry a message worth showing to a developer.
pub trait ErrorDetail {
    /// The most specific message available, if any.
    fn detail(&self) -> Option<String>;
}

impl ErrorDetail for str {
    fn detail(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl ErrorDetail for String {
    fn detail(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl ErrorDetail for anyhow::Error {
    fn detail(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl ErrorDetail for dyn std::error::Error + '_ {
    fn detail(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl ErrorDetail for dyn std::error::Error + Send + Sync + '_ {
    fn detail(&self) -> Option<String> {
        Some(self.to_string())
    }
}

/// Only string values have a message; anything else falls back to the generic text.
impl ErrorDetail for Value {
    fn detail(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }
}

macro_rules! display_detail {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ErrorDetail for $ty {
                fn detail(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )+
    };
}

display_detail!(TokenError, VerifyFailure, AdminAuthError, StoreError);

#[derive(Debug, Clone, Copy, Default)]
pub struct SafeErrorFormatter {
    mode: DeploymentMode,
}

impl SafeErrorFormatter {
    #[must_use]
    pub const fn new(mode: DeploymentMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub const fn mode(&self) -> DeploymentMode {
        self.mode
    }

    /// In production always `generic`, otherwise the error's own message.
    #[must_use]
    pub fn format<E: ErrorDetail + ?Sized>(&self, error: &E, generic: &str) -> String {
        if self.mode.is_production() {
            return generic.to_string();
        }
        error.detail().unwrap_or_else(|| generic.to_string())
    }

    /// JSON error body: `{ error, code?, details? }`.
    ///
    /// `details` is only present outside production.
    #[must_use]
    pub fn body<E: ErrorDetail + ?Sized>(
        &self,
        error: &E,
        generic: Option<&str>,
        code: Option<&str>,
    ) -> Value {
        let generic = generic.unwrap_or(DEFAULT_GENERIC_MESSAGE);
        let mut body = Map::new();
        body.insert("error".to_string(), json!(self.format(error, generic)));
        if let Some(code) = code {
            body.insert("code".to_string(), json!(code));
        }
        if !self.mode.is_production() {
            if let Some(details) = error.detail() {
                body.insert("details".to_string(), json!(details));
            }
        }
        Value::Object(body)
    }
}
