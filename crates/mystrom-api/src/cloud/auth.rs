// Cloud API authentication
//
// Form-encoded email/password login. A successful response carries an
// opaque `authToken`; the caller stores it and passes it back on every
// subsequent call.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::cloud::client::{CloudClient, vendor_error};
use crate::error::Error;
use crate::payload::{self, parse_json_payload};

impl CloudClient {
    /// Authenticate with the cloud and return the session token.
    ///
    /// Performs exactly one request. Any of a non-2xx status, a vendor
    /// `{"status":"error"}` body, a non-JSON body, or a missing `authToken`
    /// field yields [`Error::Authentication`]. Transport failures are
    /// returned as [`Error::Transport`].
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, Error> {
        let url = self.api_url("auth")?;

        debug!("logging in at {}", url);

        let resp = self
            .http()
            .post(url)
            .form(&[("email", email), ("password", password.expose_secret())])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", payload::preview(&body)),
            });
        }

        let value = parse_json_payload(&body).map_err(|e| Error::Authentication {
            message: format!("login response unreadable: {e}"),
        })?;

        if let Some(message) = vendor_error(&value) {
            return Err(Error::Authentication { message });
        }

        let token = value
            .get("authToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "login response did not contain an auth token".into(),
            })?;

        debug!("login successful");
        Ok(SecretString::from(token.to_owned()))
    }
}
