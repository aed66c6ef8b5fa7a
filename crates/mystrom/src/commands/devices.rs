//! `mystrom devices`: one login + enumeration, printed as a table.

use std::sync::Arc;

use mystrom_core::{MemoryStore, StateStore, SyncController};
use mystrom_core::registry::{device_address, poll_interval};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::{build_controller, load_config};

#[derive(Debug, Serialize)]
struct DeviceView {
    id: String,
    name: Option<String>,
    hardware_type: String,
    profile: &'static str,
    ip_address: Option<String>,
    poll_interval_secs: Option<u64>,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    hardware_type: String,
    #[tabled(rename = "Profile")]
    profile: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Poll (s)")]
    interval: String,
}

impl From<&DeviceView> for DeviceRow {
    fn from(d: &DeviceView) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone().unwrap_or_default(),
            hardware_type: d.hardware_type.clone(),
            profile: d.profile.into(),
            ip: d.ip_address.clone().unwrap_or_else(|| "-".into()),
            interval: match d.poll_interval_secs {
                Some(0) => "off".into(),
                Some(secs) => secs.to_string(),
                None => "-".into(),
            },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let path = cfg.state_path();
    let store = Arc::new(MemoryStore::open(&path)?);
    let controller = build_controller(&cfg, &store)?;

    let views = list_devices(&controller, store.as_ref()).await;
    store.save(&path)?;

    let out = output::render_list(global.output, &views?, |d| DeviceRow::from(d))?;
    output::print_output(&out);
    Ok(())
}

/// Start the engine, read back every enumerated device, and stop the engine
/// again whether or not the listing succeeded.
async fn list_devices(
    controller: &SyncController,
    store: &dyn StateStore,
) -> Result<Vec<DeviceView>, CliError> {
    let result = match controller.start().await {
        Ok(()) => collect_views(controller, store).await,
        Err(e) => Err(e.into()),
    };
    controller.shutdown().await;
    result
}

async fn collect_views(
    controller: &SyncController,
    store: &dyn StateStore,
) -> Result<Vec<DeviceView>, CliError> {
    let mut views = Vec::new();
    for device in controller.registry().current().iter() {
        views.push(DeviceView {
            id: device.id.clone(),
            name: device.name.clone(),
            hardware_type: device.hardware_type.to_string(),
            profile: device.profile.name,
            ip_address: device_address(store, &device.id).await,
            poll_interval_secs: poll_interval(store, &device.id).await?,
        });
    }
    Ok(views)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use mystrom_config::Config;
    use mystrom_core::namespace::{CONNECTION, LOCAL_UPDATE_INTERVAL};
    use mystrom_core::{CoreError, ObjectMeta, State, StateValue};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Memory store whose `localUpdateInterval` reads fail.
    #[derive(Default)]
    struct FailingIntervals(MemoryStore);

    #[async_trait]
    impl StateStore for FailingIntervals {
        async fn ensure_object(&self, path: &str, meta: ObjectMeta) -> Result<bool, CoreError> {
            self.0.ensure_object(path, meta).await
        }

        async fn get_state(&self, path: &str) -> Result<Option<State>, CoreError> {
            if path.ends_with(LOCAL_UPDATE_INTERVAL) {
                return Err(CoreError::Store {
                    message: "read failed".into(),
                });
            }
            self.0.get_state(path).await
        }

        async fn set_state(&self, path: &str, value: StateValue, ack: bool) -> Result<(), CoreError> {
            self.0.set_state(path, value, ack).await
        }
    }

    #[tokio::test]
    async fn test_failed_listing_still_stops_engine() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authToken": "tok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/devices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"devices": [{"id": "A", "type": "wse"}]})),
            )
            .mount(&server)
            .await;

        let mut cfg = Config::default();
        cfg.cloud.url = format!("{}/api", server.uri());
        cfg.cloud.email = Some("user@example.com".into());
        cfg.cloud.password = Some("pw".into());
        cfg.polling.settle_delay = 3600;

        let store = Arc::new(FailingIntervals::default());
        let sync = mystrom_config::to_sync_config(&cfg).unwrap();
        let controller = SyncController::from_config(sync, store.clone()).unwrap();

        let result = list_devices(&controller, store.as_ref()).await;

        assert!(matches!(result, Err(CliError::State { .. })), "got {result:?}");
        assert_eq!(store.0.value(CONNECTION), Some(StateValue::Bool(false)));
        assert_eq!(controller.scheduler().active_timers(), 0);
    }
}
