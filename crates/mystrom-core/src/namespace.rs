// ── State namespace layout ──
//
// Every node path is `.`-separated. Per-device subtrees are rooted at the
// device id; `appId` and `info.connection` live at the top level.

pub const APP_ID: &str = "appId";
pub const CONNECTION: &str = "info.connection";

pub const CLOUD_STATUS: &str = "cloudStatus";
pub const CLOUD_SETTINGS: &str = "cloudSettings";
pub const CLOUD_WIFI: &str = "cloudWifi";
pub const LOCAL_DATA: &str = "localData";
pub const LOCAL_COMMANDS: &str = "localCommands";
pub const IP_ADDRESS: &str = "ipAddress";
pub const LOCAL_UPDATE_INTERVAL: &str = "localUpdateInterval";

pub const SEPARATOR: char = '.';

/// Join a path prefix and one segment. An empty prefix yields the segment.
pub fn join(prefix: &str, segment: &str) -> String {
    let segment = sanitize_segment(segment);
    if prefix.is_empty() {
        segment
    } else {
        format!("{prefix}{SEPARATOR}{segment}")
    }
}

/// `<device_id>.<suffix>`
pub fn device_node(device_id: &str, suffix: &str) -> String {
    format!("{device_id}{SEPARATOR}{suffix}")
}

/// Separator characters inside a JSON key would create phantom levels.
pub fn sanitize_segment(segment: &str) -> String {
    segment.replace(SEPARATOR, "_")
}

/// Last segment of a path.
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Cloud settings that hold a URL callback (`cloudSingleUrl`,
/// `cloudDoubleUrlOff`, ...) are the only writable cloud nodes.
pub fn is_cloud_url_key(key: &str) -> bool {
    key.starts_with("cloud") && key.contains("Url")
}
