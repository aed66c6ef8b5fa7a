// ── HTTP backends ──
//
// The engine reaches both APIs through these traits so the transport is a
// black box: `mystrom_api`'s reqwest clients in production, recording
// fakes in timer tests.

use async_trait::async_trait;
use mystrom_api::{CloudClient, CloudDevice, Error as ApiError, LocalClient};
use secrecy::SecretString;
use serde_json::Value;

/// The vendor cloud.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, ApiError>;

    async fn list_devices(
        &self,
        token: &SecretString,
        app_id: &str,
    ) -> Result<Vec<CloudDevice>, ApiError>;

    async fn device_settings(&self, token: &SecretString, id: &str) -> Result<Value, ApiError>;

    async fn wifi_info(&self, token: &SecretString, id: &str) -> Result<Value, ApiError>;

    async fn set_setting(
        &self,
        token: &SecretString,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ApiError>;
}

/// Device-local HTTP surfaces, addressed per call.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    async fn fetch(&self, address: &str, endpoint: &str) -> Result<Value, ApiError>;

    async fn command(&self, address: &str, path: &str) -> Result<(), ApiError>;

    async fn post_action(&self, address: &str, path: &str, body: String) -> Result<(), ApiError>;
}

#[async_trait]
impl CloudBackend for CloudClient {
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, ApiError> {
        CloudClient::login(self, email, password).await
    }

    async fn list_devices(
        &self,
        token: &SecretString,
        app_id: &str,
    ) -> Result<Vec<CloudDevice>, ApiError> {
        CloudClient::list_devices(self, token, app_id).await
    }

    async fn device_settings(&self, token: &SecretString, id: &str) -> Result<Value, ApiError> {
        CloudClient::device_settings(self, token, id).await
    }

    async fn wifi_info(&self, token: &SecretString, id: &str) -> Result<Value, ApiError> {
        CloudClient::wifi_info(self, token, id).await
    }

    async fn set_setting(
        &self,
        token: &SecretString,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        CloudClient::set_setting(self, token, id, key, value).await
    }
}

#[async_trait]
impl LocalBackend for LocalClient {
    async fn fetch(&self, address: &str, endpoint: &str) -> Result<Value, ApiError> {
        LocalClient::fetch(self, address, endpoint).await
    }

    async fn command(&self, address: &str, path: &str) -> Result<(), ApiError> {
        LocalClient::command(self, address, path).await
    }

    async fn post_action(&self, address: &str, path: &str, body: String) -> Result<(), ApiError> {
        LocalClient::post_action(self, address, path, body).await
    }
}
