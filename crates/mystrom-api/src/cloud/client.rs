// Cloud API HTTP client
//
// Wraps `reqwest::Client` with myStrom-specific URL construction, token
// headers, and vendor error-body detection. Endpoint groups (auth,
// devices) are implemented as inherent methods in sibling files to keep
// this module focused on transport mechanics.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::payload::{self, parse_json_payload};
use crate::transport::TransportConfig;

/// Production cloud endpoint.
pub const DEFAULT_CLOUD_URL: &str = "https://mystrom.ch/api";

const AUTH_TOKEN_HEADER: &str = "Auth-Token";

/// Raw HTTP client for the myStrom cloud API.
///
/// Stateless with respect to the session: callers pass the token on each
/// call. Responses are validated (status, HTML bodies, `{"status":"error"}`
/// envelopes) before the caller sees the JSON.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CloudClient {
    /// Create a new cloud client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. [`DEFAULT_CLOUD_URL`].
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("http://localhost:60007"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("de-de"));

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self { http, base_url })
    }

    /// Create a cloud client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for an API path: `{base}/{path}`.
    ///
    /// `Url::join` would drop the last segment of a base without a trailing
    /// slash (`/api`), so the path is appended textually.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send an authenticated GET and return the validated JSON body.
    pub(crate) async fn get(&self, url: Url, token: &SecretString) -> Result<Value, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .header(AUTH_TOKEN_HEADER, token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_cloud_response(resp).await
    }
}

/// Turn a cloud response into JSON, or the matching error.
pub(crate) async fn parse_cloud_response(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            url,
            body: payload::preview(&body),
        });
    }

    let value = parse_json_payload(&body)?;

    if let Some(message) = vendor_error(&value) {
        return Err(Error::Cloud { message });
    }

    Ok(value)
}

/// Extract the message from a `{"status": "error", ...}` body.
pub(crate) fn vendor_error(value: &Value) -> Option<String> {
    if value.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    let message = ["error", "message", "msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("unspecified vendor error");
    Some(message.to_owned())
}
