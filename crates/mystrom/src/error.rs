//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use mystrom_config::ConfigError;
use mystrom_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the myStrom cloud: {reason}")]
    #[diagnostic(
        code(mystrom::connection_failed),
        help(
            "Check network access to the cloud URL.\n\
             Run: mystrom config show"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Cloud login failed: {message}")]
    #[diagnostic(
        code(mystrom::auth_failed),
        help(
            "Verify the account email and password.\n\
             Run: mystrom config set cloud.email <EMAIL>"
        )
    )]
    AuthFailed { message: String },

    #[error("No cloud {missing} configured")]
    #[diagnostic(
        code(mystrom::no_credentials),
        help(
            "Set cloud.email in the config file and the password via\n\
             MYSTROM_PASSWORD, cloud.password_env, or cloud.password."
        )
    )]
    NoCredentials { missing: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Cloud API error: {message}")]
    #[diagnostic(code(mystrom::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(mystrom::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(mystrom::config))]
    Config(Box<figment::Error>),

    // ── State ────────────────────────────────────────────────────────
    #[error("State store error: {message}")]
    #[diagnostic(
        code(mystrom::state),
        help("Check that the state file is writable, or pass --state-file.")
    )]
    State { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(mystrom::json))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::Config(_) => exit_code::CONFIG,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message } => CliError::AuthFailed { message },
            CoreError::NotAuthenticated => CliError::AuthFailed {
                message: "no session token".into(),
            },
            CoreError::Transport { message } => CliError::ConnectionFailed { reason: message },
            CoreError::Http { status, url } => CliError::ConnectionFailed {
                reason: format!("HTTP {status} from {url}"),
            },
            CoreError::Cloud { message } | CoreError::DataFormat { message } => {
                CliError::ApiError { message }
            }
            CoreError::DeviceUnreachable { device_id } => CliError::Validation {
                field: format!("{device_id}.ipAddress"),
                reason: "no local IP address configured".into(),
            },
            CoreError::Store { message } => CliError::State { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { missing } => CliError::NoCredentials { missing },
            ConfigError::Serialization(e) => CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
