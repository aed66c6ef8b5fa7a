// ── Local poll scheduler ──
//
// One cancellable interval task per device, keyed by device id. Setting an
// interval always cancels the device's current task before starting a new
// one, so a device never has two live timers. Each tick reads the device's
// configured IP and polls the endpoints from its capability profile.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::LocalBackend;
use crate::error::CoreError;
use crate::flatten::{apply_writes, flatten};
use crate::namespace::{self, LOCAL_DATA};
use crate::registry::{Device, DeviceRegistry, device_address};
use crate::store::{ObjectMeta, StateStore};

/// Result of polling one device once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No IP configured; nothing was requested.
    Unreachable,
    Completed { succeeded: usize, failed: usize },
}

struct PollTimer {
    interval_secs: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTimer {
    fn stop(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// What a poll needs; shared between the scheduler and its timer tasks.
struct PollContext {
    local: Arc<dyn LocalBackend>,
    store: Arc<dyn StateStore>,
    registry: Arc<DeviceRegistry>,
}

pub struct LocalPollScheduler {
    ctx: Arc<PollContext>,
    timers: DashMap<String, PollTimer>,
    root: CancellationToken,
}

impl LocalPollScheduler {
    /// `root` is the parent of every timer's cancellation token; cancelling
    /// it stops all timers.
    pub fn new(
        local: Arc<dyn LocalBackend>,
        store: Arc<dyn StateStore>,
        registry: Arc<DeviceRegistry>,
        root: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                local,
                store,
                registry,
            }),
            timers: DashMap::new(),
            root,
        }
    }

    // ── Timer management ─────────────────────────────────────────────

    /// Cancel the device's timer, then start a new one if `secs > 0`.
    pub fn set_interval(&self, device_id: &str, secs: u64) {
        if let Some((_, old)) = self.timers.remove(device_id) {
            old.stop();
            debug!(device = %device_id, old_secs = old.interval_secs, "local poll timer cancelled");
        }

        if secs == 0 {
            info!(device = %device_id, "local polling disabled");
            return;
        }

        let cancel = self.root.child_token();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.ctx),
            device_id.to_owned(),
            Duration::from_secs(secs),
            cancel.clone(),
        ));

        let timer = PollTimer {
            interval_secs: secs,
            cancel,
            handle,
        };
        if let Some(raced) = self.timers.insert(device_id.to_owned(), timer) {
            raced.stop();
        }
        debug!(device = %device_id, secs, "local poll timer started");
    }

    /// Interval of the device's live timer, if any.
    pub fn interval_of(&self, device_id: &str) -> Option<u64> {
        self.timers.get(device_id).map(|t| t.interval_secs)
    }

    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Cancel the timers of devices not in `keep`.
    pub fn retain(&self, keep: &HashSet<&str>) {
        self.timers.retain(|id, timer| {
            let kept = keep.contains(id.as_str());
            if !kept {
                timer.stop();
                debug!(device = %id, "device no longer enumerated, timer cancelled");
            }
            kept
        });
    }

    /// Cancel every timer and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, timer)) = self.timers.remove(&id) {
                timer.stop();
                handles.push(timer.handle);
            }
        }
        for handle in handles {
            // Aborted tasks resolve with a cancellation JoinError.
            let _ = handle.await;
        }
        debug!("all local poll timers stopped");
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Poll one device now, independent of its timer.
    pub async fn poll_device(&self, device: &Device) -> PollOutcome {
        self.ctx.poll_device(device).await
    }

    /// Poll every enumerated device concurrently.
    pub async fn poll_all(&self) {
        let devices = self.ctx.registry.current();
        join_all(devices.iter().map(|d| self.ctx.poll_device(d))).await;
    }
}

async fn poll_loop(ctx: Arc<PollContext>, device_id: String, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(device) = ctx.registry.get(&device_id) else {
                    debug!(device = %device_id, "device left the registry, skipping tick");
                    continue;
                };
                ctx.poll_device(&device).await;
            }
        }
    }
}

impl PollContext {
    async fn poll_device(&self, device: &Device) -> PollOutcome {
        let Some(address) = device_address(self.store.as_ref(), &device.id).await else {
            warn!(device = %device.id, "no local IP address configured, skipping local poll");
            return PollOutcome::Unreachable;
        };

        let mut succeeded = 0;
        let mut failed = 0;
        for endpoint in device.profile.local_endpoints {
            match self.poll_endpoint(device, &address, endpoint).await {
                Ok(nodes) => {
                    succeeded += 1;
                    debug!(device = %device.id, endpoint, nodes, "local endpoint polled");
                }
                Err(e) => {
                    failed += 1;
                    warn!(device = %device.id, endpoint, error = %e, "local poll failed");
                }
            }
        }

        PollOutcome::Completed { succeeded, failed }
    }

    async fn poll_endpoint(
        &self,
        device: &Device,
        address: &str,
        endpoint: &str,
    ) -> Result<usize, CoreError> {
        let payload = self.local.fetch(address, endpoint).await?;

        let base = namespace::join(&device.node(LOCAL_DATA), endpoint);
        let writes = flatten(&base, &payload)?;

        let store = self.store.as_ref();
        store
            .ensure_object(&device.node(LOCAL_DATA), ObjectMeta::channel("Local data"))
            .await?;
        store.ensure_object(&base, ObjectMeta::channel(endpoint)).await?;

        let actions = device.profile.action_endpoint == Some(endpoint);
        apply_writes(store, writes, |_| actions).await
    }
}
