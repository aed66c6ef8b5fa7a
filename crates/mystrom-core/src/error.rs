// ── Core error types ──
//
// Engine-level errors from mystrom-core. The `From<mystrom_api::Error>`
// impl folds transport-layer errors into the engine taxonomy:
// authentication, cloud, data format, transport, unreachable device.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not logged in -- cloud calls require a session token")]
    NotAuthenticated,

    // ── Remote errors ────────────────────────────────────────────────
    /// Vendor error body from the cloud.
    #[error("Cloud API error: {message}")]
    Cloud { message: String },

    /// Non-2xx status from the cloud or a device.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Unexpected payload: {message}")]
    DataFormat { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Device {device_id} has no local IP address configured")]
    DeviceUnreachable { device_id: String },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("State store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Errors that stop the startup sequence.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::NotAuthenticated)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<mystrom_api::Error> for CoreError {
    fn from(err: mystrom_api::Error) -> Self {
        match err {
            mystrom_api::Error::Authentication { message } => {
                CoreError::Authentication { message }
            }
            mystrom_api::Error::Transport(e) => CoreError::Transport {
                message: e.to_string(),
            },
            mystrom_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            mystrom_api::Error::Http { status, url, .. } => CoreError::Http { status, url },
            mystrom_api::Error::Cloud { message } => CoreError::Cloud { message },
            mystrom_api::Error::DataFormat { message, body: _ } => {
                CoreError::DataFormat { message }
            }
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Store {
            message: err.to_string(),
        }
    }
}
