// ── Command dispatch ──
//
// Turns user-originated (unacknowledged) writes on writable nodes into
// HTTP calls. Three write classes, recognized by path shape:
//
//   <id>.cloudSettings.…<cloud*Url*>        → cloud setSettings
//   <id>.localCommands.<key>                → local GET from the command spec
//   <id>.localData.<action_endpoint>.<name> → local POST of the raw value
//
// Failures are logged and dropped: the store already holds the user's
// value, only the physical effect may be missing.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{CloudBackend, LocalBackend};
use crate::error::CoreError;
use crate::namespace::{self, CLOUD_SETTINGS, LOCAL_COMMANDS, LOCAL_DATA, SEPARATOR};
use crate::registry::{DeviceRegistry, device_address};
use crate::session::SessionManager;
use crate::store::{StateStore, StateValue};

/// What happened to one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Acknowledged, or not a writable path shape.
    Ignored,
    /// Handled in-process without an HTTP call (interval changes).
    Applied,
    /// The HTTP call succeeded.
    Sent,
    /// Preconditions not met (unknown device, no IP, bad value).
    Skipped { reason: String },
    /// The HTTP call failed.
    Failed { error: String },
}

/// A recognized writable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteTarget<'a> {
    CloudSetting { device_id: &'a str, key: &'a str },
    LocalCommand { device_id: &'a str, key: &'a str },
    LocalAction { device_id: &'a str, endpoint: &'a str, name: &'a str },
}

impl<'a> WriteTarget<'a> {
    pub(crate) fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.split(SEPARATOR).collect();
        match *segments.as_slice() {
            [device_id, CLOUD_SETTINGS, .., key] if namespace::is_cloud_url_key(key) => {
                Some(Self::CloudSetting { device_id, key })
            }
            [device_id, LOCAL_COMMANDS, key] => Some(Self::LocalCommand { device_id, key }),
            [device_id, LOCAL_DATA, endpoint, name] => Some(Self::LocalAction {
                device_id,
                endpoint,
                name,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for WriteTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloudSetting { key, .. } => write!(f, "cloud setting {key}"),
            Self::LocalCommand { key, .. } => write!(f, "local command {key}"),
            Self::LocalAction { endpoint, name, .. } => write!(f, "local action {endpoint}/{name}"),
        }
    }
}

pub struct CommandDispatcher {
    cloud: Arc<dyn CloudBackend>,
    local: Arc<dyn LocalBackend>,
    session: Arc<SessionManager>,
    registry: Arc<DeviceRegistry>,
    store: Arc<dyn StateStore>,
}

impl CommandDispatcher {
    pub fn new(
        cloud: Arc<dyn CloudBackend>,
        local: Arc<dyn LocalBackend>,
        session: Arc<SessionManager>,
        registry: Arc<DeviceRegistry>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            cloud,
            local,
            session,
            registry,
            store,
        }
    }

    /// Act on one state write.
    pub async fn dispatch(&self, path: &str, value: &StateValue, ack: bool) -> DispatchOutcome {
        if ack {
            return DispatchOutcome::Ignored;
        }
        let Some(target) = WriteTarget::parse(path) else {
            return DispatchOutcome::Ignored;
        };

        let outcome = match target {
            WriteTarget::CloudSetting { device_id, key } => {
                self.cloud_setting(device_id, key, value).await
            }
            WriteTarget::LocalCommand { device_id, key } => {
                self.local_command(device_id, key, value).await
            }
            WriteTarget::LocalAction {
                device_id,
                endpoint,
                name,
            } => self.local_action(device_id, endpoint, name, value).await,
        };

        match &outcome {
            DispatchOutcome::Sent => info!(path, %target, "write dispatched"),
            DispatchOutcome::Skipped { reason } => warn!(path, %target, reason, "write skipped"),
            DispatchOutcome::Failed { error } => warn!(path, %target, error, "write failed"),
            DispatchOutcome::Ignored | DispatchOutcome::Applied => {}
        }
        outcome
    }

    async fn cloud_setting(&self, device_id: &str, key: &str, value: &StateValue) -> DispatchOutcome {
        let token = match self.session.token() {
            Ok(token) => token,
            Err(e) => return failed(&e),
        };
        match self
            .cloud
            .set_setting(&token, device_id, key, &value.to_raw_string())
            .await
        {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => failed(&e.into()),
        }
    }

    async fn local_command(&self, device_id: &str, key: &str, value: &StateValue) -> DispatchOutcome {
        let Some(device) = self.registry.get(device_id) else {
            return skipped("unknown device");
        };
        // Unknown keys never get nodes, but the store may hold stale ones
        // from a device whose type changed.
        let Some(command) = device.profile.command(key) else {
            return skipped("command not supported by this hardware type");
        };
        let Some(on) = value.as_bool() else {
            return skipped("value is not a boolean");
        };
        let Some(address) = device_address(self.store.as_ref(), device_id).await else {
            return unreachable(device_id);
        };

        match self.local.command(&address, &command.request_path(on)).await {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => failed(&e.into()),
        }
    }

    async fn local_action(
        &self,
        device_id: &str,
        endpoint: &str,
        name: &str,
        value: &StateValue,
    ) -> DispatchOutcome {
        let Some(device) = self.registry.get(device_id) else {
            return DispatchOutcome::Ignored;
        };
        if device.profile.action_endpoint != Some(endpoint) {
            return DispatchOutcome::Ignored;
        }
        let Some(address) = device_address(self.store.as_ref(), device_id).await else {
            return unreachable(device_id);
        };

        let path = format!("{endpoint}/{name}");
        match self
            .local
            .post_action(&address, &path, value.to_raw_string())
            .await
        {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => failed(&e.into()),
        }
    }
}

fn skipped(reason: &str) -> DispatchOutcome {
    DispatchOutcome::Skipped {
        reason: reason.to_owned(),
    }
}

fn unreachable(device_id: &str) -> DispatchOutcome {
    DispatchOutcome::Skipped {
        reason: CoreError::DeviceUnreachable {
            device_id: device_id.to_owned(),
        }
        .to_string(),
    }
}

fn failed(error: &CoreError) -> DispatchOutcome {
    DispatchOutcome::Failed {
        error: error.to_string(),
    }
}
