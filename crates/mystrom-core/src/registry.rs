// ── Device registry ──
//
// The set of devices known from the last cloud enumeration. Readers get
// an `Arc` snapshot; a refresh swaps in a complete new list, so a reader
// never sees a half-updated registry and stale devices vanish at once.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use mystrom_api::CloudDevice;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::CloudBackend;
use crate::capability::{CapabilityProfile, HardwareType, profile_for};
use crate::error::CoreError;
use crate::flatten::{apply_writes, flatten};
use crate::namespace::{self, CLOUD_STATUS, IP_ADDRESS, LOCAL_COMMANDS, LOCAL_UPDATE_INTERVAL};
use crate::session::SessionManager;
use crate::store::{ObjectMeta, StateStore, StateValue, ValueKind};

/// A device from the cloud list, with its capability profile resolved.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub hardware_type: HardwareType,
    pub profile: &'static CapabilityProfile,
}

impl Device {
    pub fn new(id: impl Into<String>, name: Option<String>, hardware_type: HardwareType) -> Self {
        let profile = profile_for(&hardware_type);
        Self {
            id: id.into(),
            name,
            hardware_type,
            profile,
        }
    }

    pub fn from_cloud(device: &CloudDevice) -> Self {
        Self::new(
            device.id.clone(),
            device.name.clone(),
            HardwareType::new(&device.device_type),
        )
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// `<id>.<suffix>`
    pub fn node(&self, suffix: &str) -> String {
        namespace::device_node(&self.id, suffix)
    }
}

pub struct DeviceRegistry {
    devices: ArcSwap<Vec<Arc<Device>>>,
    default_poll_interval_secs: u64,
}

impl DeviceRegistry {
    pub fn new(default_poll_interval_secs: u64) -> Self {
        Self {
            devices: ArcSwap::from_pointee(Vec::new()),
            default_poll_interval_secs,
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.load().iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new device list, dropping duplicate ids (first wins).
    pub fn replace(&self, devices: Vec<Device>) -> Arc<Vec<Arc<Device>>> {
        let mut seen = HashSet::new();
        let unique: Vec<Arc<Device>> = devices
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.id.clone());
                if !fresh {
                    warn!(device = %d.id, "duplicate device id in cloud list, ignoring");
                }
                fresh
            })
            .map(Arc::new)
            .collect();

        let snapshot = Arc::new(unique);
        self.devices.store(Arc::clone(&snapshot));
        snapshot
    }

    /// Fetch the cloud device list, replace the registry, and materialize
    /// each device's metadata and configuration nodes.
    ///
    /// Only the list call itself can fail the refresh; a store error while
    /// materializing one device is logged and the others continue.
    pub async fn refresh(
        &self,
        cloud: &dyn CloudBackend,
        session: &SessionManager,
        store: &dyn StateStore,
        app_id: &str,
    ) -> Result<Arc<Vec<Arc<Device>>>, CoreError> {
        let token = session.token()?;
        let records = cloud.list_devices(&token, app_id).await?;

        let snapshot = self.replace(records.iter().map(Device::from_cloud).collect());
        info!(count = snapshot.len(), "device list refreshed");

        for device in snapshot.iter() {
            let Some(record) = records.iter().find(|r| r.id == device.id) else {
                continue;
            };
            if let Err(e) = self.materialize(store, device, &record.record).await {
                warn!(device = %device.id, error = %e, "failed to write device nodes");
            }
        }

        Ok(snapshot)
    }

    async fn materialize(
        &self,
        store: &dyn StateStore,
        device: &Device,
        record: &serde_json::Map<String, Value>,
    ) -> Result<(), CoreError> {
        store
            .ensure_object(&device.id, ObjectMeta::device(device.display_name()))
            .await?;

        let status_base = device.node(CLOUD_STATUS);
        store
            .ensure_object(&status_base, ObjectMeta::channel("Status via App"))
            .await?;
        let writes = flatten(&status_base, &Value::Object(record.clone()))?;
        apply_writes(store, writes, |_| false).await?;

        let ip_path = device.node(IP_ADDRESS);
        store
            .ensure_object(
                &ip_path,
                ObjectMeta::state("Local IP address", ValueKind::String, true)
                    .with_role("info.ip"),
            )
            .await?;
        if store.get_state(&ip_path).await?.is_none() {
            store
                .set_state(&ip_path, StateValue::Text(String::new()), true)
                .await?;
        }

        let interval_path = device.node(LOCAL_UPDATE_INTERVAL);
        store
            .ensure_object(
                &interval_path,
                ObjectMeta::state("Local update interval (s)", ValueKind::Number, true)
                    .with_role("level.interval"),
            )
            .await?;
        if store.get_state(&interval_path).await?.is_none() {
            #[allow(clippy::cast_precision_loss)]
            let default = self.default_poll_interval_secs as f64;
            store
                .set_state(&interval_path, StateValue::Number(default), true)
                .await?;
        }

        if !device.profile.commands.is_empty() {
            let commands_base = device.node(LOCAL_COMMANDS);
            store
                .ensure_object(&commands_base, ObjectMeta::channel("Local commands"))
                .await?;
            for command in device.profile.commands {
                store
                    .ensure_object(
                        &namespace::join(&commands_base, command.key),
                        ObjectMeta::state(command.key, ValueKind::Boolean, true)
                            .with_role("switch"),
                    )
                    .await?;
            }
        }

        debug!(device = %device.id, profile = device.profile.name, "device nodes written");
        Ok(())
    }
}

/// The device's configured LAN address, if any.
pub async fn device_address(store: &dyn StateStore, device_id: &str) -> Option<String> {
    let path = namespace::device_node(device_id, IP_ADDRESS);
    match store.get_state(&path).await {
        Ok(Some(state)) => state
            .value
            .as_str()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_owned),
        Ok(None) => None,
        Err(e) => {
            warn!(device = %device_id, error = %e, "failed to read ipAddress");
            None
        }
    }
}

/// Configured poll interval in whole seconds; negative or non-numeric
/// values count as disabled.
pub async fn poll_interval(store: &dyn StateStore, device_id: &str) -> Result<Option<u64>, CoreError> {
    let path = namespace::device_node(device_id, LOCAL_UPDATE_INTERVAL);
    Ok(store
        .get_state(&path)
        .await?
        .map(|state| interval_secs(&state.value)))
}

pub fn interval_secs(value: &StateValue) -> u64 {
    match value.as_f64() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(secs) if secs.is_finite() && secs > 0.0 => secs.round() as u64,
        _ => 0,
    }
}
