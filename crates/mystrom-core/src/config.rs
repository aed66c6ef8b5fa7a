// ── Runtime engine configuration ──
//
// These types describe *how* the engine talks to the cloud and the
// devices. They carry credential data and timing, but never touch disk.
// The binary builds a `SyncConfig` through mystrom-config and hands it in.

use std::time::Duration;

use mystrom_api::cloud::DEFAULT_CLOUD_URL;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Cloud account credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// When per-device cloud details (settings, wifi info) are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailFetchPolicy {
    /// Once per device id per process; later refreshes go through
    /// `SyncController::refresh_details`.
    #[default]
    FirstDiscovery,
    /// On every enumeration, including the periodic ones.
    EveryEnumeration,
}

/// Configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cloud API root (e.g., `https://mystrom.ch/api`).
    pub cloud_url: Url,
    pub credentials: Credentials,
    /// Per-request HTTP timeout, cloud and local.
    pub timeout: Duration,
    /// Value written to a new device's `localUpdateInterval` node (seconds).
    pub default_poll_interval_secs: u64,
    /// How often the device list is re-fetched.
    pub enumeration_interval: Duration,
    /// Delay between the first enumeration and the first local poll pass.
    pub settle_delay: Duration,
    pub detail_policy: DetailFetchPolicy,
}

impl SyncConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            cloud_url: default_cloud_url(),
            credentials,
            timeout: Duration::from_secs(30),
            default_poll_interval_secs: 30,
            enumeration_interval: Duration::from_secs(30 * 60),
            settle_delay: Duration::from_secs(5),
            detail_policy: DetailFetchPolicy::default(),
        }
    }
}

pub fn default_cloud_url() -> Url {
    Url::parse(DEFAULT_CLOUD_URL).expect("DEFAULT_CLOUD_URL is a valid URL")
}
