// ── Sync controller ──
//
// Lifecycle for one cloud account: login, device enumeration, per-device
// cloud details, local poll timers, and the periodic re-enumeration task.
// Writes coming from the state tree are routed through `handle_state_change`.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;
use futures::future::join_all;
use mystrom_api::cloud::models::{IPV4_KEYS, wifi_info_body, wifi_ipv4};
use mystrom_api::{CloudClient, LocalClient, TransportConfig};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app_id;
use crate::backend::{CloudBackend, LocalBackend};
use crate::config::{DetailFetchPolicy, SyncConfig};
use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::error::CoreError;
use crate::flatten::{apply_writes, expand_embedded, flatten};
use crate::namespace::{
    self, CLOUD_SETTINGS, CLOUD_WIFI, CONNECTION, IP_ADDRESS, LOCAL_UPDATE_INTERVAL, SEPARATOR,
};
use crate::registry::{Device, DeviceRegistry, interval_secs, poll_interval};
use crate::scheduler::LocalPollScheduler;
use crate::session::SessionManager;
use crate::store::{ObjectMeta, StateStore, StateValue, ValueKind};

// ── SyncState ────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unauthenticated,
    Authenticated,
    Enumerated,
}

// ── SyncController ───────────────────────────────────────────────

/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: SyncConfig,
    store: Arc<dyn StateStore>,
    cloud: Arc<dyn CloudBackend>,
    session: Arc<SessionManager>,
    registry: Arc<DeviceRegistry>,
    scheduler: Arc<LocalPollScheduler>,
    dispatcher: CommandDispatcher,
    state: watch::Sender<SyncState>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    details_fetched: DashSet<String>,
    app_id: OnceCell<String>,
}

impl SyncController {
    /// Create a controller over explicit backends. Does NOT log in --
    /// call [`start()`](Self::start).
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn StateStore>,
        cloud: Arc<dyn CloudBackend>,
        local: Arc<dyn LocalBackend>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&cloud),
            config.credentials.clone(),
        ));
        let registry = Arc::new(DeviceRegistry::new(config.default_poll_interval_secs));
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(LocalPollScheduler::new(
            Arc::clone(&local),
            Arc::clone(&store),
            Arc::clone(&registry),
            cancel.clone(),
        ));
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&cloud),
            local,
            Arc::clone(&session),
            Arc::clone(&registry),
            Arc::clone(&store),
        );
        let (state, _) = watch::channel(SyncState::Unauthenticated);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                cloud,
                session,
                registry,
                scheduler,
                dispatcher,
                state,
                cancel,
                task_handles: Mutex::new(Vec::new()),
                details_fetched: DashSet::new(),
                app_id: OnceCell::new(),
            }),
        }
    }

    /// Create a controller talking HTTP through the reqwest clients.
    pub fn from_config(config: SyncConfig, store: Arc<dyn StateStore>) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let cloud = CloudClient::new(config.cloud_url.clone(), &transport)?;
        let local = LocalClient::new(&transport)?;
        Ok(Self::new(config, store, Arc::new(cloud), Arc::new(local)))
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Log in, enumerate, and spawn the background tasks.
    ///
    /// A failed login leaves the controller `Unauthenticated` with nothing
    /// started. A failed first enumeration is returned as well, but the
    /// background tasks are not spawned either.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.set_connection(false).await?;

        if let Err(e) = self.inner.session.login().await {
            error!(error = %e, "cloud login failed, engine not started");
            return Err(e);
        }
        self.set_connection(true).await?;
        self.inner.state.send_replace(SyncState::Authenticated);

        self.enumerate().await?;

        let mut handles = self.inner.task_handles.lock().await;
        let period = self.inner.config.enumeration_interval;
        if !period.is_zero() {
            handles.push(tokio::spawn(enumeration_task(
                self.clone(),
                period,
                self.inner.cancel.clone(),
            )));
        }
        handles.push(tokio::spawn(settle_task(self.clone(), self.inner.cancel.clone())));

        info!(devices = self.inner.registry.len(), "sync engine started");
        Ok(())
    }

    /// Stop every background task and timer, then mark the connection down.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.scheduler.shutdown().await;

        if let Err(e) = self.set_connection(false).await {
            warn!(error = %e, "failed to reset info.connection");
        }
        info!("sync engine stopped");
    }

    // ── Enumeration ──────────────────────────────────────────────

    /// Refresh the device list, fetch cloud details per the detail
    /// policy, and reconcile the poll timers.
    pub async fn enumerate(&self) -> Result<(), CoreError> {
        let app_id = self.app_id().await?;
        let inner = &self.inner;
        let devices = inner
            .registry
            .refresh(
                inner.cloud.as_ref(),
                &inner.session,
                inner.store.as_ref(),
                &app_id,
            )
            .await?;
        inner.state.send_replace(SyncState::Enumerated);

        let keep: HashSet<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        inner.scheduler.retain(&keep);

        for device in devices.iter() {
            let secs = match poll_interval(inner.store.as_ref(), &device.id).await {
                Ok(secs) => secs.unwrap_or(inner.config.default_poll_interval_secs),
                Err(e) => {
                    warn!(device = %device.id, error = %e, "failed to read localUpdateInterval");
                    continue;
                }
            };
            if inner.scheduler.interval_of(&device.id).unwrap_or(0) != secs {
                inner.scheduler.set_interval(&device.id, secs);
            }
        }

        let pending: Vec<&Arc<Device>> = devices
            .iter()
            .filter(|d| match inner.config.detail_policy {
                DetailFetchPolicy::EveryEnumeration => true,
                DetailFetchPolicy::FirstDiscovery => !inner.details_fetched.contains(&d.id),
            })
            .collect();
        join_all(pending.into_iter().map(|d| self.fetch_details(d))).await;

        Ok(())
    }

    /// Re-fetch one device's cloud settings and wifi info now.
    pub async fn refresh_details(&self, device_id: &str) -> Result<(), CoreError> {
        let device = self
            .inner
            .registry
            .get(device_id)
            .ok_or_else(|| CoreError::Config {
                message: format!("unknown device {device_id}"),
            })?;
        let settings = self.fetch_settings(&device).await;
        let wifi = self.fetch_wifi(&device).await;
        settings?;
        wifi?;
        self.inner.details_fetched.insert(device.id.clone());
        Ok(())
    }

    /// Both detail calls run; each failure is logged on its own. The device
    /// counts as fetched only when both succeeded.
    async fn fetch_details(&self, device: &Device) {
        let (settings, wifi) = tokio::join!(self.fetch_settings(device), self.fetch_wifi(device));

        if let Err(e) = &settings {
            warn!(device = %device.id, error = %e, "cloud settings fetch failed");
        }
        if let Err(e) = &wifi {
            warn!(device = %device.id, error = %e, "cloud wifi info fetch failed");
        }
        if settings.is_ok() && wifi.is_ok() {
            self.inner.details_fetched.insert(device.id.clone());
        }
    }

    async fn fetch_settings(&self, device: &Device) -> Result<(), CoreError> {
        let inner = &self.inner;
        let token = inner.session.token()?;
        let response = inner.cloud.device_settings(&token, &device.id).await?;

        let base = device.node(CLOUD_SETTINGS);
        let store = inner.store.as_ref();
        store
            .ensure_object(&base, ObjectMeta::channel("Settings via App"))
            .await?;
        let writes = flatten(&base, &settings_tree(&response))?;
        let count = apply_writes(store, writes, |path| {
            namespace::is_cloud_url_key(namespace::leaf_name(path))
        })
        .await?;

        debug!(device = %device.id, nodes = count, "cloud settings written");
        Ok(())
    }

    async fn fetch_wifi(&self, device: &Device) -> Result<(), CoreError> {
        let inner = &self.inner;
        let token = inner.session.token()?;
        let response = inner.cloud.wifi_info(&token, &device.id).await?;

        let base = device.node(CLOUD_WIFI);
        let store = inner.store.as_ref();
        store
            .ensure_object(&base, ObjectMeta::channel("Wifi Settings via App"))
            .await?;
        let previous_cloud_ip = reported_ip(store, &base).await?;
        let writes = flatten(&base, wifi_info_body(&response))?;
        apply_writes(store, writes, |_| false).await?;

        let Some(ip) = wifi_ipv4(&response) else {
            return Ok(());
        };
        let ip_path = device.node(IP_ADDRESS);
        let current = store
            .get_state(&ip_path)
            .await?
            .and_then(|state| state.value.as_str().map(|s| s.trim().to_owned()))
            .unwrap_or_default();

        // An address that differs from what the cloud reported last time was
        // set by the user and stays.
        if current.is_empty() || Some(&current) == previous_cloud_ip.as_ref() {
            if current != ip {
                store
                    .set_state(&ip_path, StateValue::Text(ip.clone()), true)
                    .await?;
                info!(device = %device.id, %ip, "local IP address from cloud wifi info");
            }
        } else {
            debug!(device = %device.id, %ip, configured = %current, "keeping user-set IP address");
        }
        Ok(())
    }

    async fn app_id(&self) -> Result<String, CoreError> {
        self.inner
            .app_id
            .get_or_try_init(|| app_id::load_or_create(self.inner.store.as_ref()))
            .await
            .cloned()
    }

    // ── State writes ─────────────────────────────────────────────

    /// Route one state write. Interval and IP address changes are applied
    /// and acknowledged here; everything else goes to the dispatcher.
    pub async fn handle_state_change(
        &self,
        path: &str,
        value: &StateValue,
        ack: bool,
    ) -> DispatchOutcome {
        if !ack {
            match device_setting(path) {
                Some((device_id, LOCAL_UPDATE_INTERVAL)) => {
                    return self.apply_interval(device_id, path, value).await;
                }
                Some((device_id, IP_ADDRESS)) => {
                    return self.apply_address(device_id, path, value).await;
                }
                _ => {}
            }
        }
        self.inner.dispatcher.dispatch(path, value, ack).await
    }

    async fn apply_address(&self, device_id: &str, path: &str, value: &StateValue) -> DispatchOutcome {
        if self.inner.registry.get(device_id).is_none() {
            warn!(device = %device_id, "IP address change for unknown device");
            return DispatchOutcome::Skipped {
                reason: "unknown device".into(),
            };
        }

        let address = match value {
            StateValue::Null => String::new(),
            other => other.to_raw_string().trim().to_owned(),
        };
        if let Err(e) = self
            .inner
            .store
            .set_state(path, StateValue::Text(address.clone()), true)
            .await
        {
            warn!(device = %device_id, error = %e, "failed to acknowledge IP address");
        }
        info!(device = %device_id, %address, "local IP address changed");
        DispatchOutcome::Applied
    }

    async fn apply_interval(&self, device_id: &str, path: &str, value: &StateValue) -> DispatchOutcome {
        if self.inner.registry.get(device_id).is_none() {
            warn!(device = %device_id, "interval change for unknown device");
            return DispatchOutcome::Skipped {
                reason: "unknown device".into(),
            };
        }

        let secs = interval_secs(value);
        self.inner.scheduler.set_interval(device_id, secs);
        if let Err(e) = self.inner.store.set_state(path, value.clone(), true).await {
            warn!(device = %device_id, error = %e, "failed to acknowledge interval");
        }
        info!(device = %device_id, secs, "local update interval changed");
        DispatchOutcome::Applied
    }

    async fn set_connection(&self, connected: bool) -> Result<(), CoreError> {
        let store = self.inner.store.as_ref();
        store
            .ensure_object(
                CONNECTION,
                ObjectMeta::state("Cloud connection", ValueKind::Boolean, false)
                    .with_role("indicator.connected"),
            )
            .await?;
        store.set_state(CONNECTION, connected.into(), true).await
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &Arc<LocalPollScheduler> {
        &self.inner.scheduler
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn enumeration_task(
    controller: SyncController,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = controller.enumerate().await {
                    warn!(error = %e, "periodic enumeration failed");
                }
            }
        }
    }
}

/// Wait out the settle delay, then run the first local poll pass.
async fn settle_task(controller: SyncController, cancel: CancellationToken) {
    let delay = controller.inner.config.settle_delay;
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {
            debug!("settle delay elapsed, first local poll pass");
            controller.inner.scheduler.poll_all().await;
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// `<id>.<setting>` → `(<id>, <setting>)` for the per-device settings the
/// controller owns.
fn device_setting(path: &str) -> Option<(&str, &str)> {
    let (device_id, suffix) = path.split_once(SEPARATOR)?;
    matches!(suffix, LOCAL_UPDATE_INTERVAL | IP_ADDRESS).then_some((device_id, suffix))
}

/// The device address the cloud reported in the previous wifi info.
async fn reported_ip(store: &dyn StateStore, wifi_base: &str) -> Result<Option<String>, CoreError> {
    for key in IPV4_KEYS {
        let path = namespace::join(wifi_base, key);
        if let Some(state) = store.get_state(&path).await? {
            if let Some(ip) = state.value.as_str().map(str::trim).filter(|ip| !ip.is_empty()) {
                return Ok(Some(ip.to_owned()));
            }
        }
    }
    Ok(None)
}

/// Merge a getSettings response into one object: `isLocal` plus the keys
/// of the JSON-encoded `settings` and `value` fields.
fn settings_tree(response: &Value) -> Value {
    let mut merged = Map::new();
    if let Some(is_local) = response.get("isLocal") {
        merged.insert("isLocal".to_owned(), is_local.clone());
    }
    for field in ["settings", "value"] {
        let Some(raw) = response.get(field) else {
            continue;
        };
        match expand_embedded(raw).into_owned() {
            Value::Object(map) => merged.extend(map),
            Value::Null => {}
            other => {
                merged.insert(field.to_owned(), other);
            }
        }
    }
    Value::Object(merged)
}
