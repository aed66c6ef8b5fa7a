// ── Capability tables ──
//
// Static per-hardware-type description of what a device serves locally
// (endpoints to poll), which boolean commands it accepts, and where its
// action URLs live. Behavior is data-driven from this table; nothing
// downstream branches on the hardware tag.

use std::fmt;

use tracing::info;

/// Open-ended hardware tag from the cloud device list (`wse`, `wbp`, ...).
/// Stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HardwareType(String);

impl HardwareType {
    pub fn new(tag: &str) -> Self {
        Self(tag.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a command's boolean value is encoded into its request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEncoding {
    /// Append `1` or `0` to the path (`relay?state=` + `1`).
    StateSuffix,
    /// Send the path as-is; the value only triggers the request.
    NoSuffix,
}

/// A writable local command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub key: &'static str,
    pub path: &'static str,
    pub encoding: CommandEncoding,
}

impl CommandSpec {
    /// Request path for a write of `on`.
    pub fn request_path(&self, on: bool) -> String {
        match self.encoding {
            CommandEncoding::StateSuffix => format!("{}{}", self.path, if on { "1" } else { "0" }),
            CommandEncoding::NoSuffix => self.path.to_owned(),
        }
    }
}

/// Everything the engine does locally with one hardware type.
#[derive(Debug, PartialEq, Eq)]
pub struct CapabilityProfile {
    pub name: &'static str,
    /// Polled in order on every local tick.
    pub local_endpoints: &'static [&'static str],
    pub commands: &'static [CommandSpec],
    /// Endpoint whose flattened nodes are writable action URLs
    /// (`POST {action_endpoint}/{name}`).
    pub action_endpoint: Option<&'static str>,
}

impl CapabilityProfile {
    pub fn command(&self, key: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.key == key)
    }

    pub fn is_default(&self) -> bool {
        std::ptr::eq(self, &DEFAULT_PROFILE)
    }
}

// ── Table ────────────────────────────────────────────────────────────

const SWITCH: CommandSpec = CommandSpec {
    key: "switch",
    path: "relay?state=",
    encoding: CommandEncoding::StateSuffix,
};

const TOGGLE: CommandSpec = CommandSpec {
    key: "toggle",
    path: "toggle",
    encoding: CommandEncoding::NoSuffix,
};

static SWITCH_V1: CapabilityProfile = CapabilityProfile {
    name: "switch-v1",
    local_endpoints: &["report"],
    commands: &[SWITCH, TOGGLE],
    action_endpoint: None,
};

static SWITCH_V2: CapabilityProfile = CapabilityProfile {
    name: "switch",
    local_endpoints: &["report", "temp", "api/v1/settings"],
    commands: &[SWITCH, TOGGLE],
    action_endpoint: None,
};

static LIGHT: CapabilityProfile = CapabilityProfile {
    name: "light",
    local_endpoints: &["api/v1/device"],
    commands: &[TOGGLE],
    action_endpoint: None,
};

static BUTTON: CapabilityProfile = CapabilityProfile {
    name: "button",
    local_endpoints: &["api/v1/device", "api/v1/settings", "api/v1/action"],
    commands: &[],
    action_endpoint: Some("api/v1/action"),
};

static MOTION: CapabilityProfile = CapabilityProfile {
    name: "motion",
    local_endpoints: &["api/v1/settings", "api/v1/sensors", "api/v1/action/pir"],
    commands: &[],
    action_endpoint: Some("api/v1/action/pir"),
};

/// Fallback for unrecognized hardware: read-only device info.
pub static DEFAULT_PROFILE: CapabilityProfile = CapabilityProfile {
    name: "default",
    local_endpoints: &["api/v1/device"],
    commands: &[],
    action_endpoint: None,
};

/// Look up a hardware tag without logging.
pub fn lookup(hardware_type: &HardwareType) -> Option<&'static CapabilityProfile> {
    match hardware_type.as_str() {
        "wsw" => Some(&SWITCH_V1),
        "ws2" | "wse" => Some(&SWITCH_V2),
        "wrb" | "wrs" => Some(&LIGHT),
        "wbp" | "wbs" => Some(&BUTTON),
        "wms" => Some(&MOTION),
        _ => None,
    }
}

/// Profile for a hardware tag, falling back to [`DEFAULT_PROFILE`].
pub fn profile_for(hardware_type: &HardwareType) -> &'static CapabilityProfile {
    lookup(hardware_type).unwrap_or_else(|| {
        info!(
            hardware_type = %hardware_type,
            "unrecognized hardware type, using default capability profile"
        );
        &DEFAULT_PROFILE
    })
}
