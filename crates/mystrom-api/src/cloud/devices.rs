// Cloud device endpoints
//
// Device enumeration, per-device detail reads (settings, wifi info), and
// the single write the cloud supports for us: URL-callback settings.

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cloud::client::CloudClient;
use crate::cloud::models::CloudDevice;
use crate::error::Error;
use crate::payload;

impl CloudClient {
    /// List every device registered to the account.
    ///
    /// `app_id` is the stable client identifier sent as `deviceToken`.
    /// Records without an `id` are skipped.
    pub async fn list_devices(
        &self,
        token: &SecretString,
        app_id: &str,
    ) -> Result<Vec<CloudDevice>, Error> {
        let mut url = self.api_url("devices")?;
        url.query_pairs_mut()
            .append_pair("alerts", "true")
            .append_pair("allCost", "true")
            .append_pair("checkFirmware", "true")
            .append_pair("deviceToken", app_id)
            .append_pair("schedule", "true");

        let body = self.get(url, token).await?;

        let Some(records) = body.get("devices").and_then(Value::as_array) else {
            return Err(Error::DataFormat {
                message: "device list response has no `devices` array".into(),
                body: payload::preview(&body.to_string()),
            });
        };

        let devices: Vec<CloudDevice> = records
            .iter()
            .filter_map(|record| match record {
                Value::Object(map) => {
                    let device = CloudDevice::from_record(map.clone());
                    if device.is_none() {
                        warn!("skipping device record without id");
                    }
                    device
                }
                other => {
                    warn!(record = %other, "skipping non-object device record");
                    None
                }
            })
            .collect();

        debug!(count = devices.len(), "device list fetched");
        Ok(devices)
    }

    /// `GET /device/getSettings?id=` -- the `settings` and `value` fields
    /// of the response are JSON documents encoded as strings.
    pub async fn device_settings(&self, token: &SecretString, id: &str) -> Result<Value, Error> {
        let mut url = self.api_url("device/getSettings")?;
        url.query_pairs_mut().append_pair("id", id);
        self.get(url, token).await
    }

    /// `GET /device/wifiInfo?id=` -- network details including the
    /// device's LAN address.
    pub async fn wifi_info(&self, token: &SecretString, id: &str) -> Result<Value, Error> {
        let mut url = self.api_url("device/wifiInfo")?;
        url.query_pairs_mut().append_pair("id", id);
        self.get(url, token).await
    }

    /// Write one URL-callback setting: `GET /device/setSettings?<key>=<value>&id=`.
    pub async fn set_setting(
        &self,
        token: &SecretString,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let mut url = self.api_url("device/setSettings")?;
        url.query_pairs_mut()
            .append_pair(key, value)
            .append_pair("id", id);
        self.get(url, token).await?;
        Ok(())
    }
}
