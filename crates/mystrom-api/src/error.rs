use thiserror::Error;

/// Top-level error type for the `mystrom-api` crate.
///
/// Covers every failure mode across both API surfaces: cloud
/// authentication, transport, HTTP status, vendor error bodies, and
/// payloads that are not the JSON the caller expected.
/// `mystrom-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected or answered with a malformed body.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-2xx status from either API.
    #[error("HTTP {status} from {url}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    // ── Cloud ───────────────────────────────────────────────────────
    /// The cloud answered 2xx but with a `{"status": "error"}` body.
    #[error("Cloud API error: {message}")]
    Cloud { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Body is not the expected JSON shape (HTML error page, empty body,
    /// truncated document). Carries a prefix of the raw body for debugging.
    #[error("Unexpected payload: {message}")]
    DataFormat { message: String, body: String },
}

impl Error {
    /// Returns `true` if the remote side refused our credentials or token.
    pub fn is_auth_rejected(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Returns `true` if this error happened below HTTP (no response at all).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// HTTP status code, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
