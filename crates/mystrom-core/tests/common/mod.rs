// Shared fakes for the engine tests. They answer instantly and record
// every call, so timer tests can run on a paused clock.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mystrom_api::{CloudDevice, Error as ApiError};
use mystrom_core::{
    CloudBackend, Credentials, Device, DeviceRegistry, HardwareType, LocalBackend, MemoryStore,
    StateStore, StateValue, SyncConfig,
};
use secrecy::SecretString;
use serde_json::{Value, json};

// ── Cloud ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCloud {
    pub devices: Mutex<Vec<Value>>,
    pub reject_login: bool,
    pub settings_calls: Mutex<Vec<String>>,
    pub wifi_calls: Mutex<Vec<String>>,
    pub set_calls: Mutex<Vec<(String, String, String)>>,
    pub wifi_ip: Mutex<Option<String>>,
}

impl FakeCloud {
    pub fn with_devices(records: Vec<Value>) -> Self {
        Self {
            devices: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_devices(&self, records: Vec<Value>) {
        *self.devices.lock().unwrap() = records;
    }

    /// Address reported as `ipv4` in every wifi info response.
    pub fn set_wifi_ip(&self, ip: &str) {
        *self.wifi_ip.lock().unwrap() = Some(ip.to_owned());
    }
}

#[async_trait]
impl CloudBackend for FakeCloud {
    async fn login(&self, _email: &str, _password: &SecretString) -> Result<SecretString, ApiError> {
        if self.reject_login {
            return Err(ApiError::Authentication {
                message: "HTTP 401".into(),
            });
        }
        Ok(SecretString::from("fake-token".to_string()))
    }

    async fn list_devices(
        &self,
        _token: &SecretString,
        _app_id: &str,
    ) -> Result<Vec<CloudDevice>, ApiError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .filter_map(CloudDevice::from_record)
            .collect())
    }

    async fn device_settings(&self, _token: &SecretString, id: &str) -> Result<Value, ApiError> {
        self.settings_calls.lock().unwrap().push(id.to_owned());
        Ok(json!({
            "id": id,
            "isLocal": true,
            "settings": "{\"cloudSingleUrl\":\"\"}",
            "value": "{}",
        }))
    }

    async fn wifi_info(&self, _token: &SecretString, id: &str) -> Result<Value, ApiError> {
        self.wifi_calls.lock().unwrap().push(id.to_owned());
        let mut info = json!({"ssid": "home", "signal": -60});
        if let Some(ip) = self.wifi_ip.lock().unwrap().clone() {
            info["ipv4"] = json!(ip);
        }
        Ok(json!({"id": id, "info": info}))
    }

    async fn set_setting(
        &self,
        _token: &SecretString,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        self.set_calls
            .lock()
            .unwrap()
            .push((id.to_owned(), key.to_owned(), value.to_owned()));
        Ok(())
    }
}

// ── Local ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLocal {
    pub fetches: Mutex<Vec<(String, String)>>,
    pub commands: Mutex<Vec<(String, String)>>,
    pub failing_endpoints: HashSet<String>,
}

impl FakeLocal {
    pub fn failing(endpoints: &[&str]) -> Self {
        Self {
            failing_endpoints: endpoints.iter().map(|e| (*e).to_owned()).collect(),
            ..Self::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetches_for(&self, address: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == address)
            .count()
    }
}

#[async_trait]
impl LocalBackend for FakeLocal {
    async fn fetch(&self, address: &str, endpoint: &str) -> Result<Value, ApiError> {
        self.fetches
            .lock()
            .unwrap()
            .push((address.to_owned(), endpoint.to_owned()));
        if self.failing_endpoints.contains(endpoint) {
            return Err(ApiError::Http {
                status: 500,
                url: format!("http://{address}/{endpoint}"),
                body: String::new(),
            });
        }
        Ok(json!({"relay": true, "power": 12.5}))
    }

    async fn command(&self, address: &str, path: &str) -> Result<(), ApiError> {
        self.commands
            .lock()
            .unwrap()
            .push((address.to_owned(), path.to_owned()));
        Ok(())
    }

    async fn post_action(&self, _address: &str, _path: &str, _body: String) -> Result<(), ApiError> {
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

pub fn config() -> SyncConfig {
    SyncConfig::new(Credentials {
        email: "user@example.com".into(),
        password: SecretString::from("hunter2".to_string()),
    })
}

pub fn record(id: &str, device_type: &str) -> Value {
    json!({"id": id, "name": format!("Device {id}"), "type": device_type, "power": 1.0})
}

pub fn registry_with(devices: &[(&str, &str)]) -> Arc<DeviceRegistry> {
    let registry = Arc::new(DeviceRegistry::new(30));
    registry.replace(
        devices
            .iter()
            .map(|(id, tag)| Device::new(*id, None, HardwareType::new(tag)))
            .collect(),
    );
    registry
}

pub async fn set_ip(store: &MemoryStore, device_id: &str, ip: &str) {
    store
        .set_state(&format!("{device_id}.ipAddress"), StateValue::from(ip), true)
        .await
        .unwrap();
}
