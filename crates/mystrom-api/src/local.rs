// Device-local HTTP API client
//
// Every device serves a small REST surface on the LAN: telemetry reads
// (`report`, `temp`, `api/v1/...`), switch commands as GETs
// (`relay?state=1`, `toggle`), and button/PIR action URLs as POSTs.
// Devices are addressed by the IP (optionally `ip:port`) stored per device.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::payload::{self, parse_json_payload};
use crate::transport::TransportConfig;

/// HTTP client for device-local endpoints.
///
/// One instance serves every device; the address is supplied per call.
#[derive(Clone)]
pub struct LocalClient {
    http: reqwest::Client,
}

impl LocalClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Build `http://{address}/{path}`. `path` may carry a query string
    /// (`relay?state=1`), so it is appended textually rather than joined.
    pub fn device_url(address: &str, path: &str) -> Result<Url, Error> {
        let address = address.trim().trim_end_matches('/');
        let base = if address.contains("://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };
        Ok(Url::parse(&format!(
            "{base}/{}",
            path.trim_start_matches('/')
        ))?)
    }

    /// GET a telemetry/config endpoint and return its JSON body.
    ///
    /// Non-JSON bodies (the device web UI, an empty 200) are rejected with
    /// [`Error::DataFormat`] before the caller can flatten anything.
    pub async fn fetch(&self, address: &str, endpoint: &str) -> Result<Value, Error> {
        let url = Self::device_url(address, endpoint)?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let body = checked_body(resp).await?;
        parse_json_payload(&body)
    }

    /// Fire a GET command (`relay?state=1`, `toggle`). The body is ignored.
    pub async fn command(&self, address: &str, path: &str) -> Result<(), Error> {
        let url = Self::device_url(address, path)?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        checked_body(resp).await?;
        Ok(())
    }

    /// POST a raw body to an action endpoint (`api/v1/action/single`).
    pub async fn post_action(&self, address: &str, path: &str, body: String) -> Result<(), Error> {
        let url = Self::device_url(address, path)?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        checked_body(resp).await?;
        Ok(())
    }
}

async fn checked_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp.text().await.map_err(Error::Transport)?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Http {
            status: status.as_u16(),
            url,
            body: payload::preview(&body),
        })
    }
}
