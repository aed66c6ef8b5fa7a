// mystrom-core: Device synchronization engine between mystrom-api and a state tree.

pub mod app_id;
pub mod backend;
pub mod capability;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod flatten;
pub mod namespace;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{CloudBackend, LocalBackend};
pub use capability::{
    CapabilityProfile, CommandEncoding, CommandSpec, HardwareType, DEFAULT_PROFILE, profile_for,
};
pub use config::{Credentials, DetailFetchPolicy, SyncConfig};
pub use controller::{SyncController, SyncState};
pub use dispatch::{CommandDispatcher, DispatchOutcome};
pub use error::CoreError;
pub use flatten::{NodeWrite, flatten};
pub use registry::{Device, DeviceRegistry};
pub use scheduler::{LocalPollScheduler, PollOutcome};
pub use session::SessionManager;
pub use store::{MemoryStore, ObjectKind, ObjectMeta, State, StateStore, StateValue, ValueKind};
