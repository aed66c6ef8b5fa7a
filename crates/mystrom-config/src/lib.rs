//! Configuration for the myStrom bridge.
//!
//! TOML file, `MYSTROM_`-prefixed environment overrides, password
//! resolution (env + named env var + plaintext), and translation to
//! `mystrom_core::SyncConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mystrom_core::{Credentials, DetailFetchPolicy, SyncConfig};

/// Env var consulted first for the cloud password.
pub const PASSWORD_ENV: &str = "MYSTROM_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no cloud {missing} configured")]
    NoCredentials { missing: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudSection,

    #[serde(default)]
    pub polling: PollingSection,

    /// Where `mystrom run` keeps the state tree between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CloudSection {
    /// Cloud API root.
    #[serde(default = "default_url")]
    pub url: String,

    /// Account email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Password (plaintext; prefer `MYSTROM_PASSWORD` or `password_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            email: None,
            password: None,
            password_env: None,
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingSection {
    /// Initial `localUpdateInterval` for new devices, seconds. 0 disables.
    #[serde(default = "default_interval")]
    pub default_interval: u64,

    /// Seconds between cloud device list refreshes. 0 disables.
    #[serde(default = "default_enumeration_interval")]
    pub enumeration_interval: u64,

    /// Seconds between startup enumeration and the first local poll.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,

    #[serde(default)]
    pub detail_policy: DetailFetchPolicy,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            default_interval: default_interval(),
            enumeration_interval: default_enumeration_interval(),
            settle_delay: default_settle_delay(),
            detail_policy: DetailFetchPolicy::default(),
        }
    }
}

fn default_url() -> String {
    mystrom_core::config::default_cloud_url().to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_interval() -> u64 {
    30
}
fn default_enumeration_interval() -> u64 {
    30 * 60
}
fn default_settle_delay() -> u64 {
    5
}

impl Config {
    /// Copy with the plaintext password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.cloud.password.is_some() {
            cfg.cloud.password = Some("********".into());
        }
        cfg
    }

    /// Resolved state snapshot path.
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_path)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("ch", "mystrom", "mystrom-bridge")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("mystrom-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file contributes nothing.
///
/// Env keys nest on `__`: `MYSTROM_CLOUD__EMAIL`,
/// `MYSTROM_POLLING__DEFAULT_INTERVAL`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MYSTROM_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// `MYSTROM_PASSWORD`, then the env var named by `password_env`, then
/// the plaintext `password`.
pub fn resolve_password(cloud: &CloudSection) -> Result<SecretString, ConfigError> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    if let Some(ref env_name) = cloud.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = cloud.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        missing: "password".into(),
    })
}

pub fn resolve_credentials(cloud: &CloudSection) -> Result<Credentials, ConfigError> {
    let email = cloud
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ConfigError::NoCredentials {
            missing: "email".into(),
        })?;
    let password = resolve_password(cloud)?;
    Ok(Credentials { email, password })
}

/// Build the engine configuration.
pub fn to_sync_config(cfg: &Config) -> Result<SyncConfig, ConfigError> {
    let cloud_url: url::Url = cfg.cloud.url.parse().map_err(|_| ConfigError::Validation {
        field: "cloud.url".into(),
        reason: format!("invalid URL: {}", cfg.cloud.url),
    })?;
    if cfg.cloud.timeout == 0 {
        return Err(ConfigError::Validation {
            field: "cloud.timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let credentials = resolve_credentials(&cfg.cloud)?;

    Ok(SyncConfig {
        cloud_url,
        credentials,
        timeout: Duration::from_secs(cfg.cloud.timeout),
        default_poll_interval_secs: cfg.polling.default_interval,
        enumeration_interval: Duration::from_secs(cfg.polling.enumeration_interval),
        settle_delay: Duration::from_secs(cfg.polling.settle_delay),
        detail_policy: cfg.polling.detail_policy,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("missing.toml")).unwrap();
            assert_eq!(cfg, Config::default());
            assert_eq!(cfg.cloud.url, "https://mystrom.ch/api");
            assert_eq!(cfg.polling.enumeration_interval, 1800);
            Ok(())
        });
    }

    #[test]
    fn file_values_are_loaded() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                state_file = "/var/lib/mystrom/state.json"

                [cloud]
                email = "user@example.com"
                password = "hunter2"

                [polling]
                default_interval = 10
                detail_policy = "every-enumeration"
                "#,
            )?;

            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.cloud.email.as_deref(), Some("user@example.com"));
            assert_eq!(cfg.cloud.timeout, 30);
            assert_eq!(cfg.polling.default_interval, 10);
            assert_eq!(cfg.polling.detail_policy, DetailFetchPolicy::EveryEnumeration);
            assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/mystrom/state.json"));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[cloud]\nemail = \"file@example.com\"\n")?;
            jail.set_env("MYSTROM_CLOUD__EMAIL", "env@example.com");
            jail.set_env("MYSTROM_POLLING__SETTLE_DELAY", "1");

            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.cloud.email.as_deref(), Some("env@example.com"));
            assert_eq!(cfg.polling.settle_delay, 1);
            Ok(())
        });
    }

    #[test]
    fn password_resolution_order() {
        Jail::expect_with(|jail| {
            let mut cloud = CloudSection {
                password: Some("plain".into()),
                ..CloudSection::default()
            };
            assert_eq!(resolve_password(&cloud).unwrap().expose_secret(), "plain");

            cloud.password_env = Some("MY_PW".into());
            jail.set_env("MY_PW", "named");
            assert_eq!(resolve_password(&cloud).unwrap().expose_secret(), "named");

            jail.set_env(PASSWORD_ENV, "primary");
            assert_eq!(resolve_password(&cloud).unwrap().expose_secret(), "primary");
            Ok(())
        });
    }

    #[test]
    fn sync_config_requires_credentials() {
        Jail::expect_with(|_jail| {
            let cfg = Config::default();
            assert!(matches!(
                to_sync_config(&cfg),
                Err(ConfigError::NoCredentials { .. })
            ));

            let mut cfg = Config::default();
            cfg.cloud.email = Some("user@example.com".into());
            cfg.cloud.password = Some("pw".into());
            cfg.polling.settle_delay = 2;
            let sync = to_sync_config(&cfg).unwrap();
            assert_eq!(sync.settle_delay, Duration::from_secs(2));
            assert_eq!(sync.credentials.email, "user@example.com");
            Ok(())
        });
    }

    #[test]
    fn invalid_url_is_rejected() {
        let mut cfg = Config::default();
        cfg.cloud.url = "not a url".into();
        assert!(matches!(
            to_sync_config(&cfg),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.cloud.email = Some("user@example.com".into());
        cfg.cloud.password_env = Some("MY_PW".into());

        save_config_to(&cfg, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("password_env = \"MY_PW\""));
        assert!(!raw.contains("state_file"));

        let loaded: Config = toml::from_str(&raw).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn redacted_masks_password() {
        let mut cfg = Config::default();
        cfg.cloud.password = Some("hunter2".into());
        assert_eq!(cfg.redacted().cloud.password.as_deref(), Some("********"));
        assert_eq!(Config::default().redacted().cloud.password, None);
    }
}
